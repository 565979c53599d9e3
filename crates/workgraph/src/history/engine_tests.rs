//! History-engine tests: undo/redo round trips and redo-stack
//! invalidation, driven through the service façade against in-memory
//! databases.

use crate::history::HistoryEngine;
use crate::storage::{ActionHistoryRepository, NewAction};
use crate::testing::{memory_database, memory_service, new_item};
use workgraph_api::{ActionFilter, ActionType, ActiveFilter, Status};

#[tokio::test]
async fn undo_and_redo_of_a_single_add() {
    let service = memory_service().await;

    let view = service.add_work_item(new_item("A")).await.unwrap();
    let id = view.work_item.work_item_id;

    let undone = service.undo().await.unwrap().unwrap();
    assert_eq!(undone.action_type, ActionType::AddWorkItem);
    assert!(undone.is_undone);

    let after_undo = service.get_work_item(id, ActiveFilter::Any).await.unwrap();
    assert!(!after_undo.work_item.is_active);

    let actions = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap();
    let undo_count = actions
        .iter()
        .filter(|a| a.action_type == ActionType::UndoAction)
        .count();
    assert_eq!(undo_count, 1);

    let redone = service.redo().await.unwrap().unwrap();
    assert_eq!(redone.action_id, undone.action_id);

    let after_redo = service.get_work_item(id, ActiveFilter::Any).await.unwrap();
    assert!(after_redo.work_item.is_active);

    let latest = service
        .list_recent_actions(ActionFilter {
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(latest[0].action_type, ActionType::RedoAction);
}

#[tokio::test]
async fn undo_with_nothing_to_undo_returns_none() {
    let service = memory_service().await;
    assert!(service.undo().await.unwrap().is_none());
    assert!(service.redo().await.unwrap().is_none());
}

#[tokio::test]
async fn forward_mutation_invalidates_the_redo_stack() {
    let service = memory_service().await;

    // Add X, undo it, then let a new forward action kill the redo.
    service.add_work_item(new_item("X")).await.unwrap();
    let undone = service.undo().await.unwrap().unwrap();
    let undo_id = undone.undone_at_action_id.unwrap();

    let y = service.add_work_item(new_item("Y")).await.unwrap();

    assert!(service.redo().await.unwrap().is_none());

    let history = ActionHistoryRepository::new();
    let undo_action = history
        .find_action_by_id(service.database().pool(), undo_id)
        .await
        .unwrap()
        .unwrap();
    assert!(undo_action.is_undone);

    // The invalidating action is the add of Y.
    let add_y = history
        .find_action_by_id(
            service.database().pool(),
            undo_action.undone_at_action_id.unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(add_y.action_type, ActionType::AddWorkItem);
    assert_eq!(add_y.work_item_id, Some(y.work_item.work_item_id));
}

#[tokio::test]
async fn undo_and_redo_walk_the_history_linearly() {
    let service = memory_service().await;

    let a = service.add_work_item(new_item("A")).await.unwrap();
    let b = service.add_work_item(new_item("B")).await.unwrap();
    let a_id = a.work_item.work_item_id;
    let b_id = b.work_item.work_item_id;

    // Undo pops newest-first: B, then A.
    service.undo().await.unwrap().unwrap();
    assert!(!service.get_work_item(b_id, ActiveFilter::Any).await.unwrap().work_item.is_active);
    assert!(service.get_work_item(a_id, ActiveFilter::Any).await.unwrap().work_item.is_active);

    service.undo().await.unwrap().unwrap();
    assert!(!service.get_work_item(a_id, ActiveFilter::Any).await.unwrap().work_item.is_active);

    // Redo restores in reverse: A, then B.
    let first_redo = service.redo().await.unwrap().unwrap();
    assert_eq!(first_redo.work_item_id, Some(a_id));
    assert!(service.get_work_item(a_id, ActiveFilter::Any).await.unwrap().work_item.is_active);

    let second_redo = service.redo().await.unwrap().unwrap();
    assert_eq!(second_redo.work_item_id, Some(b_id));
    assert!(service.get_work_item(b_id, ActiveFilter::Any).await.unwrap().work_item.is_active);
}

#[tokio::test]
async fn undo_of_a_field_update_restores_the_previous_value() {
    let service = memory_service().await;

    let view = service.add_work_item(new_item("Task")).await.unwrap();
    let id = view.work_item.work_item_id;

    service.set_status(id, Status::InProgress).await.unwrap();
    service.undo().await.unwrap().unwrap();

    let restored = service.get_work_item(id, ActiveFilter::Active).await.unwrap();
    assert_eq!(restored.work_item.status, Status::Todo);

    service.redo().await.unwrap().unwrap();
    let redone = service.get_work_item(id, ActiveFilter::Active).await.unwrap();
    assert_eq!(redone.work_item.status, Status::InProgress);
}

#[tokio::test]
async fn undoing_an_action_without_steps_records_bookkeeping_only() {
    let db = memory_database().await;
    let engine = HistoryEngine::new(db.clone());
    let history = ActionHistoryRepository::new();

    // An action row with no steps, as an older writer might have left it.
    let mut tx = db.begin().await.unwrap();
    let action = history
        .create_action(
            &mut tx,
            &NewAction {
                action_type: ActionType::UpdateWorkItem,
                work_item_id: None,
                description: "Legacy update".to_string(),
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let undone = engine.undo().await.unwrap().unwrap();
    assert_eq!(undone.action_id, action.action_id);
    assert!(undone.is_undone);

    let undo_action = history
        .find_action_by_id(db.pool(), undone.undone_at_action_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(undo_action.action_type, ActionType::UndoAction);
    assert!(undo_action.description.contains("no undo steps recorded"));

    // The bookkeeping pair round-trips through redo as well.
    let redone = engine.redo().await.unwrap().unwrap();
    assert_eq!(redone.action_id, action.action_id);
    assert!(!redone.is_undone);
}

#[tokio::test]
async fn redo_stack_is_empty_after_every_forward_mutation() {
    let service = memory_service().await;
    let history = ActionHistoryRepository::new();

    service.add_work_item(new_item("One")).await.unwrap();
    service.undo().await.unwrap();
    service.add_work_item(new_item("Two")).await.unwrap();

    let pending = history
        .find_recent_unredone_undo_actions(service.database().pool(), 100)
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn replay_conflicts_do_not_abort_an_undo() {
    let db = memory_database().await;
    let engine = HistoryEngine::new(db.clone());
    let history = ActionHistoryRepository::new();

    // A recorded action whose step points at a row that never existed.
    // Replay logs the zero-row update and the undo still completes.
    let mut tx = db.begin().await.unwrap();
    let action = history
        .create_action(
            &mut tx,
            &NewAction {
                action_type: ActionType::SetName,
                work_item_id: None,
                description: "Renamed a ghost".to_string(),
            },
        )
        .await
        .unwrap();
    history
        .create_undo_step(
            &mut tx,
            action.action_id,
            1,
            &crate::storage::NewUndoStep {
                table_name: workgraph_api::HistoryTable::WorkItems,
                record_id: uuid::Uuid::new_v4().to_string(),
                old_data: serde_json::json!({
                    "work_item_id": uuid::Uuid::new_v4().to_string(),
                    "name": "Before",
                }),
                new_data: serde_json::json!({
                    "work_item_id": uuid::Uuid::new_v4().to_string(),
                    "name": "After",
                }),
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let undone = engine.undo().await.unwrap().unwrap();
    assert_eq!(undone.action_id, action.action_id);
    assert!(undone.is_undone);
}
