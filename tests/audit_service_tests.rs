mod common;

use common::{caller, cast, seed_project};
use country_projects::{
    models::{AuditAction, AuditLogFilter, Role, TargetType, UpdateProjectRequest, UpdateUserRequest},
    services::audit::{DEFAULT_RECENT_LIMIT, MAX_RECENT_LIMIT},
};
use uuid::Uuid;

#[tokio::test]
async fn test_non_super_callers_only_see_their_country() {
    let c = cast().await;
    seed_project(&c.state.repo, "Texas Grid", "USA", &c.usa_admin).await;
    seed_project(&c.state.repo, "London Rail", "UK", &c.uk_admin).await;

    let usa = c
        .state
        .audit
        .list(&caller(&c.usa_admin), AuditLogFilter::default())
        .await
        .unwrap();
    assert_eq!(usa.len(), 1);
    assert!(usa.iter().all(|e| e.country.as_deref() == Some("USA")));

    let all = c
        .state
        .audit
        .list(&caller(&c.root), AuditLogFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_members_only_see_project_entries() {
    let c = cast().await;
    seed_project(&c.state.repo, "Texas Grid", "USA", &c.usa_admin).await;
    // A user entry in the member's own country.
    c.state
        .users
        .update_user(
            &caller(&c.usa_admin),
            c.usa_member.id,
            UpdateUserRequest {
                email: Some("member@usa.example.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let admin_view = c
        .state
        .audit
        .list(&caller(&c.usa_admin), AuditLogFilter::default())
        .await
        .unwrap();
    assert_eq!(admin_view.len(), 2);

    let member = caller(&c.usa_member);
    let member_view = c
        .state
        .audit
        .list(&member, AuditLogFilter::default())
        .await
        .unwrap();
    assert_eq!(member_view.len(), 1);
    assert_eq!(member_view[0].target_type, TargetType::Project);

    let asked_for_users = c
        .state
        .audit
        .list(
            &member,
            AuditLogFilter {
                target_type: Some(TargetType::User),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(asked_for_users.is_empty());
}

#[tokio::test]
async fn test_filters_by_action_and_target() {
    let c = cast().await;
    let admin = caller(&c.usa_admin);
    let first = seed_project(&c.state.repo, "First", "USA", &c.usa_admin).await;
    let second = seed_project(&c.state.repo, "Second", "USA", &c.usa_admin).await;
    c.state
        .projects
        .update(
            &admin,
            first.id,
            UpdateProjectRequest {
                title: Some("First (renamed)".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let updates = c
        .state
        .audit
        .list(
            &admin,
            AuditLogFilter {
                action: Some(AuditAction::Update),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].target_id, first.id);

    let about_second = c
        .state
        .audit
        .list(
            &admin,
            AuditLogFilter {
                target_id: Some(second.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(about_second.len(), 1);
    assert_eq!(about_second[0].action, AuditAction::Create);

    let nothing = c
        .state
        .audit
        .list(
            &admin,
            AuditLogFilter {
                target_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn test_entries_are_newest_first_and_keep_the_actor() {
    let c = cast().await;
    let project = seed_project(&c.state.repo, "Texas Grid", "USA", &c.usa_admin).await;
    c.state
        .projects
        .update(
            &caller(&c.usa_member),
            project.id,
            UpdateProjectRequest {
                description: Some("Phase two".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let entries = c
        .state
        .audit
        .list(&caller(&c.root), AuditLogFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, AuditAction::Update);
    assert_eq!(entries[0].actor_id, Some(c.usa_member.id));
    assert_eq!(entries[0].actor_username.as_deref(), Some("usa_member"));
    assert_eq!(entries[1].action, AuditAction::Create);
    assert!(entries[0].timestamp >= entries[1].timestamp);
}

#[tokio::test]
async fn test_recent_defaults_and_caps_the_limit() {
    let c = cast().await;
    for n in 0..(DEFAULT_RECENT_LIMIT + 5) {
        seed_project(&c.state.repo, &format!("Project {n}"), "USA", &c.usa_admin).await;
    }
    let admin = caller(&c.usa_admin);

    let default = c.state.audit.recent(&admin, None).await.unwrap();
    assert_eq!(default.len(), DEFAULT_RECENT_LIMIT);

    let three = c.state.audit.recent(&admin, Some(3)).await.unwrap();
    assert_eq!(three.len(), 3);
    assert_eq!(three[0].id, default[0].id);

    let capped = c.state.audit.recent(&admin, Some(10_000)).await.unwrap();
    assert_eq!(capped.len(), DEFAULT_RECENT_LIMIT + 5);
    assert!(capped.len() <= MAX_RECENT_LIMIT);
}

#[tokio::test]
async fn test_caller_without_country_is_denied() {
    let c = cast().await;
    let mut orphan = caller(&c.usa_admin);
    orphan.country = None;
    orphan.role = Role::CountryAdmin;

    assert!(
        c.state
            .audit
            .list(&orphan, AuditLogFilter::default())
            .await
            .is_err()
    );
}
