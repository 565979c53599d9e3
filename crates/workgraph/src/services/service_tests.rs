//! Service-level scenario tests against in-memory databases.

use uuid::Uuid;

use crate::storage::{ActionHistoryRepository, DependencyRepository};
use crate::testing::{memory_service, new_child, new_item};
use workgraph_api::{
    ActionFilter, ActionType, ActiveFilter, DependencyType, DomainError, ListFilter,
    NewDependency, Priority, Status, TreeNodeInput, TreeOptions, ValidationError,
};

fn dependency(target: Uuid) -> NewDependency {
    NewDependency {
        depends_on_work_item_id: target,
        dependency_type: None,
    }
}

fn linked_dependency(target: Uuid) -> NewDependency {
    NewDependency {
        depends_on_work_item_id: target,
        dependency_type: Some(DependencyType::Linked),
    }
}

#[tokio::test]
async fn cascade_delete_round_trips_through_undo_and_redo() {
    let service = memory_service().await;
    let history = ActionHistoryRepository::new();
    let links = DependencyRepository::new();

    // P -> {C1, C2}, C1 -> G, and a dependency C2 -> C1.
    let p = service.add_work_item(new_item("P")).await.unwrap();
    let p_id = p.work_item.work_item_id;
    let c1 = service.add_work_item(new_child("C1", p_id)).await.unwrap();
    let c1_id = c1.work_item.work_item_id;
    let c2 = service.add_work_item(new_child("C2", p_id)).await.unwrap();
    let c2_id = c2.work_item.work_item_id;
    let g = service.add_work_item(new_child("G", c1_id)).await.unwrap();
    let g_id = g.work_item.work_item_id;
    service
        .add_dependencies(c2_id, vec![dependency(c1_id)])
        .await
        .unwrap();

    let outcome = service.delete_work_items(&[p_id]).await.unwrap();
    assert_eq!(outcome.deleted_count(), 4);
    assert_eq!(outcome.deactivated_dependency_keys, vec![(c2_id, c1_id)]);

    for id in [p_id, c1_id, c2_id, g_id] {
        let view = service.get_work_item(id, ActiveFilter::Any).await.unwrap();
        assert!(!view.work_item.is_active, "{id} should be inactive");
    }
    let link = links
        .find_by_keys(service.database().pool(), &[(c2_id, c1_id)], ActiveFilter::Any)
        .await
        .unwrap();
    assert!(!link[0].is_active);

    // 4 item steps + 1 link step, densely ordered from 1.
    let action_id = outcome.action_id.unwrap();
    let steps = history
        .find_undo_steps_by_action_id(service.database().pool(), action_id)
        .await
        .unwrap();
    assert_eq!(steps.len(), 5);
    for (index, step) in steps.iter().enumerate() {
        assert_eq!(step.step_order, (index as i64) + 1);
    }

    service.undo().await.unwrap().unwrap();
    for id in [p_id, c1_id, c2_id, g_id] {
        let view = service.get_work_item(id, ActiveFilter::Any).await.unwrap();
        assert!(view.work_item.is_active, "{id} should be active again");
    }
    let link = links
        .find_by_keys(service.database().pool(), &[(c2_id, c1_id)], ActiveFilter::Any)
        .await
        .unwrap();
    assert!(link[0].is_active);

    service.redo().await.unwrap().unwrap();
    for id in [p_id, c1_id, c2_id, g_id] {
        let view = service.get_work_item(id, ActiveFilter::Any).await.unwrap();
        assert!(!view.work_item.is_active, "{id} should be inactive after redo");
    }
}

#[tokio::test]
async fn dependency_reactivation_with_type_change_is_one_step() {
    let service = memory_service().await;
    let history = ActionHistoryRepository::new();

    let a = service.add_work_item(new_item("A")).await.unwrap();
    let b = service.add_work_item(new_item("B")).await.unwrap();
    let c = service.add_work_item(new_item("C")).await.unwrap();
    let (a_id, b_id, c_id) = (
        a.work_item.work_item_id,
        b.work_item.work_item_id,
        c.work_item.work_item_id,
    );

    service
        .add_dependencies(a_id, vec![dependency(b_id), dependency(c_id)])
        .await
        .unwrap();
    service.delete_dependencies(a_id, vec![b_id]).await.unwrap();

    let view = service
        .add_dependencies(a_id, vec![linked_dependency(b_id)])
        .await
        .unwrap();
    assert_eq!(view.dependencies.len(), 2);

    let actions = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap();
    let last_add = actions
        .iter()
        .find(|a| a.action_type == ActionType::AddDependencies)
        .unwrap();
    let steps = history
        .find_undo_steps_by_action_id(service.database().pool(), last_add.action_id)
        .await
        .unwrap();
    assert_eq!(steps.len(), 1);

    let links = DependencyRepository::new();
    let stored = links
        .find_by_keys(service.database().pool(), &[(a_id, b_id)], ActiveFilter::Active)
        .await
        .unwrap();
    assert_eq!(stored[0].dependency_type, DependencyType::Linked);
}

#[tokio::test]
async fn readding_an_identical_dependency_records_nothing() {
    let service = memory_service().await;

    let a = service.add_work_item(new_item("A")).await.unwrap();
    let b = service.add_work_item(new_item("B")).await.unwrap();
    let (a_id, b_id) = (a.work_item.work_item_id, b.work_item.work_item_id);

    service
        .add_dependencies(a_id, vec![dependency(b_id)])
        .await
        .unwrap();
    let before = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();

    service
        .add_dependencies(a_id, vec![dependency(b_id)])
        .await
        .unwrap();
    let after = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn dependency_errors_distinguish_missing_from_inactive() {
    let service = memory_service().await;

    let a = service.add_work_item(new_item("A")).await.unwrap();
    let b = service.add_work_item(new_item("B")).await.unwrap();
    let (a_id, b_id) = (a.work_item.work_item_id, b.work_item.work_item_id);

    // No link at all.
    let missing = service.delete_dependencies(a_id, vec![b_id]).await;
    assert!(matches!(
        missing,
        Err(DomainError::Validation(
            ValidationError::MissingDependencyLink { .. }
        ))
    ));

    // Already-inactive link.
    service
        .add_dependencies(a_id, vec![dependency(b_id)])
        .await
        .unwrap();
    service.delete_dependencies(a_id, vec![b_id]).await.unwrap();
    let inactive = service.delete_dependencies(a_id, vec![b_id]).await;
    assert!(matches!(
        inactive,
        Err(DomainError::Validation(
            ValidationError::InactiveDependencyLink { .. }
        ))
    ));

    // Self-dependency is rejected outright.
    let self_dep = service.add_dependencies(a_id, vec![dependency(a_id)]).await;
    assert!(matches!(
        self_dep,
        Err(DomainError::Validation(ValidationError::SelfDependency { .. }))
    ));

    // Inactive targets are a validation error, unknown ids are NotFound.
    service.delete_work_items(&[b_id]).await.unwrap();
    let inactive_target = service.add_dependencies(a_id, vec![dependency(b_id)]).await;
    assert!(matches!(
        inactive_target,
        Err(DomainError::Validation(
            ValidationError::InactiveDependencyTarget { .. }
        ))
    ));
    let unknown = service
        .add_dependencies(a_id, vec![dependency(Uuid::new_v4())])
        .await;
    assert!(matches!(unknown, Err(DomainError::NotFound { .. })));
}

#[tokio::test]
async fn promote_to_project_detaches_and_links() {
    let service = memory_service().await;
    let links = DependencyRepository::new();

    let p = service.add_work_item(new_item("P")).await.unwrap();
    let p_id = p.work_item.work_item_id;
    let t = service.add_work_item(new_child("T", p_id)).await.unwrap();
    let t_id = t.work_item.work_item_id;

    let promoted = service.promote_to_project(t_id).await.unwrap();
    assert!(promoted.work_item.parent_work_item_id.is_none());

    let link = links
        .find_by_keys(service.database().pool(), &[(p_id, t_id)], ActiveFilter::Active)
        .await
        .unwrap();
    assert_eq!(link.len(), 1);
    assert_eq!(link[0].dependency_type, DependencyType::Linked);

    let parent_view = service.get_work_item(p_id, ActiveFilter::Active).await.unwrap();
    assert!(parent_view.children.is_empty());

    // The promoted item is the last root.
    let roots = service
        .list_work_items(ListFilter {
            roots_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(roots.last().unwrap().work_item_id, t_id);

    service.undo().await.unwrap().unwrap();
    let restored = service.get_work_item(t_id, ActiveFilter::Active).await.unwrap();
    assert_eq!(restored.work_item.parent_work_item_id, Some(p_id));
    let link = links
        .find_by_keys(service.database().pool(), &[(p_id, t_id)], ActiveFilter::Any)
        .await
        .unwrap();
    assert!(!link[0].is_active);

    let parent_view = service.get_work_item(p_id, ActiveFilter::Active).await.unwrap();
    assert_eq!(parent_view.children.len(), 1);
}

#[tokio::test]
async fn promoting_a_root_is_a_validation_error() {
    let service = memory_service().await;
    let p = service.add_work_item(new_item("P")).await.unwrap();

    let result = service.promote_to_project(p.work_item.work_item_id).await;
    assert!(matches!(
        result,
        Err(DomainError::Validation(ValidationError::AlreadyRoot { .. }))
    ));
}

#[tokio::test]
async fn equal_value_field_set_records_no_action() {
    let service = memory_service().await;

    // The priority is already medium.
    let a = service.add_work_item(new_item("A")).await.unwrap();
    let a_id = a.work_item.work_item_id;

    let view = service.set_priority(a_id, Priority::Medium).await.unwrap();
    assert_eq!(view.work_item.priority, Priority::Medium);
    assert_eq!(view.work_item.updated_at, a.work_item.updated_at);

    let actions = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ActionType::AddWorkItem);
}

#[tokio::test]
async fn field_updates_validate_inputs() {
    let service = memory_service().await;
    let a = service.add_work_item(new_item("A")).await.unwrap();
    let a_id = a.work_item.work_item_id;

    let empty = service.set_name(a_id, "  ".to_string()).await;
    assert!(matches!(
        empty,
        Err(DomainError::Validation(ValidationError::EmptyName))
    ));

    let unknown = service.set_status(Uuid::new_v4(), Status::Done).await;
    assert!(matches!(unknown, Err(DomainError::NotFound { .. })));

    service.delete_work_items(&[a_id]).await.unwrap();
    let inactive = service.set_status(a_id, Status::Done).await;
    assert!(matches!(
        inactive,
        Err(DomainError::Validation(ValidationError::InactiveWorkItem { .. }))
    ));
}

#[tokio::test]
async fn adds_reject_missing_or_inactive_parents() {
    let service = memory_service().await;

    let missing = service
        .add_work_item(new_child("Orphan", Uuid::new_v4()))
        .await;
    assert!(matches!(missing, Err(DomainError::NotFound { .. })));

    let p = service.add_work_item(new_item("P")).await.unwrap();
    let p_id = p.work_item.work_item_id;
    service.delete_work_items(&[p_id]).await.unwrap();

    let inactive = service.add_work_item(new_child("Child", p_id)).await;
    assert!(matches!(
        inactive,
        Err(DomainError::Validation(ValidationError::InactiveParent { .. }))
    ));
}

#[tokio::test]
async fn moves_reorder_siblings_and_skip_noops() {
    let service = memory_service().await;

    let p = service.add_work_item(new_item("P")).await.unwrap();
    let p_id = p.work_item.work_item_id;
    let a = service.add_work_item(new_child("A", p_id)).await.unwrap();
    let b = service.add_work_item(new_child("B", p_id)).await.unwrap();
    let c = service.add_work_item(new_child("C", p_id)).await.unwrap();
    let (a_id, b_id, c_id) = (
        a.work_item.work_item_id,
        b.work_item.work_item_id,
        c.work_item.work_item_id,
    );

    let child_names = |view: &workgraph_api::WorkItemView| -> Vec<String> {
        view.children.iter().map(|c| c.name.clone()).collect()
    };

    // C to the front: [C, A, B].
    service.move_to_start(c_id).await.unwrap();
    let view = service.get_work_item(p_id, ActiveFilter::Active).await.unwrap();
    assert_eq!(child_names(&view), ["C", "A", "B"]);

    // C after A: [A, C, B].
    service.move_after(c_id, a_id).await.unwrap();
    let view = service.get_work_item(p_id, ActiveFilter::Active).await.unwrap();
    assert_eq!(child_names(&view), ["A", "C", "B"]);

    // B before A: [B, A, C].
    service.move_before(b_id, a_id).await.unwrap();
    let view = service.get_work_item(p_id, ActiveFilter::Active).await.unwrap();
    assert_eq!(child_names(&view), ["B", "A", "C"]);

    // C to the end: already last, a no-op.
    let action_count_before = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();
    service.move_to_end(c_id).await.unwrap();
    let action_count_after = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();
    assert_eq!(action_count_before, action_count_after);

    // Undo restores the order before the last effective move.
    service.undo().await.unwrap().unwrap();
    let view = service.get_work_item(p_id, ActiveFilter::Active).await.unwrap();
    assert_eq!(child_names(&view), ["A", "C", "B"]);
}

#[tokio::test]
async fn move_validation_errors() {
    let service = memory_service().await;

    let p1 = service.add_work_item(new_item("P1")).await.unwrap();
    let p2 = service.add_work_item(new_item("P2")).await.unwrap();
    let a = service
        .add_work_item(new_child("A", p1.work_item.work_item_id))
        .await
        .unwrap();
    let b = service
        .add_work_item(new_child("B", p2.work_item.work_item_id))
        .await
        .unwrap();
    let (a_id, b_id) = (a.work_item.work_item_id, b.work_item.work_item_id);

    let onto_self = service.move_after(a_id, a_id).await;
    assert!(matches!(
        onto_self,
        Err(DomainError::Validation(ValidationError::MoveOntoSelf { .. }))
    ));

    let cross_parent = service.move_after(a_id, b_id).await;
    assert!(matches!(
        cross_parent,
        Err(DomainError::Validation(ValidationError::NotASibling { .. }))
    ));

    let unknown_pivot = service.move_before(a_id, Uuid::new_v4()).await;
    assert!(matches!(unknown_pivot, Err(DomainError::NotFound { .. })));
}

#[tokio::test]
async fn add_tree_creates_the_forest_in_one_action() {
    let service = memory_service().await;
    let history = ActionHistoryRepository::new();

    let forest = vec![TreeNodeInput {
        name: "Release".to_string(),
        children: vec![
            TreeNodeInput {
                name: "Build".to_string(),
                ..Default::default()
            },
            TreeNodeInput {
                name: "Ship".to_string(),
                children: vec![TreeNodeInput {
                    name: "Announce".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        ],
        ..Default::default()
    }];

    let views = service.add_work_item_tree(None, forest).await.unwrap();
    assert_eq!(views.len(), 1);
    let root_id = views[0].work_item.work_item_id;

    let tree = service
        .get_full_tree(root_id, TreeOptions::default())
        .await
        .unwrap();
    assert_eq!(tree.len(), 4);
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].work_item.name, "Build");
    assert_eq!(tree.children[1].children[0].work_item.name, "Announce");

    let actions = service
        .list_recent_actions(ActionFilter {
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(actions[0].action_type, ActionType::AddWorkItemTree);
    let steps = history
        .find_undo_steps_by_action_id(service.database().pool(), actions[0].action_id)
        .await
        .unwrap();
    assert_eq!(steps.len(), 4);

    // One undo deactivates the whole forest.
    service.undo().await.unwrap().unwrap();
    let gone = service
        .get_full_tree(root_id, TreeOptions::default())
        .await;
    assert!(matches!(gone, Err(DomainError::NotFound { .. })));
    let still_there = service
        .get_full_tree(
            root_id,
            TreeOptions {
                include_inactive: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(still_there.len(), 4);
}

#[tokio::test]
async fn list_work_items_applies_filters() {
    let service = memory_service().await;

    let p = service.add_work_item(new_item("P")).await.unwrap();
    let p_id = p.work_item.work_item_id;
    let child = service.add_work_item(new_child("Child", p_id)).await.unwrap();
    service
        .set_status(child.work_item.work_item_id, Status::Done)
        .await
        .unwrap();

    let roots = service
        .list_work_items(ListFilter {
            roots_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].name, "P");

    let by_parent = service
        .list_work_items(ListFilter {
            parent: Some(Some(p_id)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_parent.len(), 1);
    assert_eq!(by_parent[0].name, "Child");

    let done = service
        .list_work_items(ListFilter {
            status: Some(Status::Done),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(done.len(), 1);

    service.delete_work_items(&[p_id]).await.unwrap();
    let active_roots = service
        .list_work_items(ListFilter {
            parent: Some(None),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(active_roots.is_empty());

    let inactive = service
        .list_work_items(ListFilter {
            is_active: ActiveFilter::Inactive,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(inactive.len(), 2);
}

#[tokio::test]
async fn new_items_are_placed_after_their_siblings() {
    let service = memory_service().await;

    let p = service.add_work_item(new_item("P")).await.unwrap();
    let p_id = p.work_item.work_item_id;
    for name in ["First", "Second", "Third"] {
        service.add_work_item(new_child(name, p_id)).await.unwrap();
    }

    let view = service.get_work_item(p_id, ActiveFilter::Active).await.unwrap();
    let names: Vec<&str> = view.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["First", "Second", "Third"]);

    // Sibling keys form a strictly increasing sequence.
    let keys: Vec<&str> = view
        .children
        .iter()
        .map(|c| c.order_key.as_deref().unwrap())
        .collect();
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[tokio::test]
async fn deleting_an_unknown_id_is_not_found() {
    let service = memory_service().await;
    let result = service.delete_work_items(&[Uuid::new_v4()]).await;
    assert!(matches!(result, Err(DomainError::NotFound { .. })));
}

#[tokio::test]
async fn deleting_an_already_inactive_tree_records_nothing() {
    let service = memory_service().await;

    let p = service.add_work_item(new_item("P")).await.unwrap();
    let p_id = p.work_item.work_item_id;
    service.delete_work_items(&[p_id]).await.unwrap();

    let before = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();
    let outcome = service.delete_work_items(&[p_id]).await.unwrap();
    assert_eq!(outcome.deleted_count(), 0);
    assert!(outcome.action_id.is_none());
    let after = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn actions_can_be_scoped_to_one_work_item() {
    let service = memory_service().await;

    let a = service.add_work_item(new_item("A")).await.unwrap();
    service.add_work_item(new_item("B")).await.unwrap();
    let a_id = a.work_item.work_item_id;
    service.set_status(a_id, Status::Review).await.unwrap();

    let scoped = service
        .list_recent_actions(ActionFilter {
            work_item_id: Some(a_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(scoped.len(), 2);
    assert!(scoped.iter().all(|action| action.work_item_id == Some(a_id)));

    let all = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].action_type, ActionType::SetStatus);
}

#[tokio::test]
async fn due_dates_compare_as_normalized_instants() {
    let service = memory_service().await;

    let a = service.add_work_item(new_item("A")).await.unwrap();
    let a_id = a.work_item.work_item_id;

    let utc: chrono::DateTime<chrono::Utc> = "2026-09-01T12:00:00Z".parse().unwrap();
    service.set_due_date(a_id, Some(utc)).await.unwrap();

    // The same instant written with an offset is still a no-op.
    let offset: chrono::DateTime<chrono::Utc> = "2026-09-01T14:00:00+02:00".parse().unwrap();
    let before = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();
    service.set_due_date(a_id, Some(offset)).await.unwrap();
    let after = service
        .list_recent_actions(ActionFilter::default())
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);

    // Clearing it is an effective change again.
    service.set_due_date(a_id, None).await.unwrap();
    let cleared = service.get_work_item(a_id, ActiveFilter::Active).await.unwrap();
    assert!(cleared.work_item.due_date.is_none());
}

#[tokio::test]
async fn hydrated_views_carry_links_in_both_directions() {
    let service = memory_service().await;

    let a = service.add_work_item(new_item("A")).await.unwrap();
    let b = service.add_work_item(new_item("B")).await.unwrap();
    let (a_id, b_id) = (a.work_item.work_item_id, b.work_item.work_item_id);
    service
        .add_dependencies(a_id, vec![dependency(b_id)])
        .await
        .unwrap();

    let a_view = service.get_work_item(a_id, ActiveFilter::Active).await.unwrap();
    assert_eq!(a_view.dependencies.len(), 1);
    assert_eq!(a_view.dependencies[0].depends_on_work_item_id, b_id);
    assert!(a_view.dependents.is_empty());

    let b_view = service.get_work_item(b_id, ActiveFilter::Active).await.unwrap();
    assert!(b_view.dependencies.is_empty());
    assert_eq!(b_view.dependents.len(), 1);
    assert_eq!(b_view.dependents[0].work_item_id, a_id);

    // Deactivating the target hides the link from the default view.
    service.delete_work_items(&[b_id]).await.unwrap();
    let a_view = service.get_work_item(a_id, ActiveFilter::Active).await.unwrap();
    assert!(a_view.dependencies.is_empty());
}
