use country_projects::{
    error::FieldErrors,
    models::{
        AuditAction, DeleteMode, DeleteParams, ProjectStatus, RegisterRequest, Role, TargetType,
        UpdateProjectRequest, UpdateUserRequest,
    },
};
use serde_json::json;
use validator::Validate;

// --- Wire formats ---

#[test]
fn test_enum_wire_names() {
    assert_eq!(json!(Role::CountryAdmin), json!("country_admin"));
    assert_eq!(json!(ProjectStatus::Completed), json!("completed"));
    assert_eq!(json!(AuditAction::Delete), json!("DELETE"));
    assert_eq!(json!(TargetType::Project), json!("Project"));

    let role: Role = serde_json::from_value(json!("super_admin")).unwrap();
    assert_eq!(role, Role::SuperAdmin);
    assert!(serde_json::from_value::<ProjectStatus>(json!("deleted")).is_err());
}

#[test]
fn test_enum_text_round_trip_matches_serde() {
    // The database stores the same strings serde emits.
    for role in [Role::SuperAdmin, Role::CountryAdmin, Role::CountryMember] {
        assert_eq!(json!(role), json!(role.as_str()));
        assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
    }
    for status in [
        ProjectStatus::Draft,
        ProjectStatus::Active,
        ProjectStatus::Completed,
        ProjectStatus::Archived,
    ] {
        assert_eq!(json!(status), json!(status.as_str()));
    }
    assert!("janitor".parse::<Role>().is_err());
}

#[test]
fn test_update_project_request_serializes_only_present_fields() {
    let req = UpdateProjectRequest {
        status: Some(ProjectStatus::Archived),
        ..Default::default()
    };
    assert_eq!(json!(req), json!({ "status": "archived" }));

    let parsed: UpdateProjectRequest = serde_json::from_value(json!({ "title": "T" })).unwrap();
    assert_eq!(parsed.title.as_deref(), Some("T"));
    assert!(parsed.description.is_none());
    assert!(parsed.expected_version.is_none());
}

#[test]
fn test_delete_params_parse_lowercase_mode() {
    let params: DeleteParams = serde_json::from_value(json!({ "mode": "soft" })).unwrap();
    assert_eq!(params.mode, Some(DeleteMode::Soft));
    let params: DeleteParams = serde_json::from_value(json!({})).unwrap();
    assert!(params.mode.is_none());
}

// --- Validation ---

#[test]
fn test_register_request_validation_rules() {
    let valid = RegisterRequest {
        username: "john_doe".to_string(),
        email: "john@example.com".to_string(),
        password: "x".to_string(),
        password_confirm: "x".to_string(),
        country: "USA".to_string(),
    };
    assert!(valid.validate().is_ok());

    let invalid = RegisterRequest {
        username: "u".repeat(151),
        email: "john-at-example".to_string(),
        country: String::new(),
        ..valid
    };
    let errors = FieldErrors::from(invalid.validate().unwrap_err());
    assert!(errors.contains("username"));
    assert!(errors.contains("email"));
    assert!(errors.contains("country"));
    assert_eq!(errors.messages("email"), ["Enter a valid email address"]);
}

#[test]
fn test_update_user_request_validates_only_present_fields() {
    assert!(UpdateUserRequest::default().validate().is_ok());

    let bad = UpdateUserRequest {
        email: Some("nope".to_string()),
        ..Default::default()
    };
    assert!(bad.validate().is_err());
}

#[test]
fn test_title_length_bound() {
    let too_long = UpdateProjectRequest {
        title: Some("t".repeat(256)),
        ..Default::default()
    };
    assert!(too_long.validate().is_err());

    let empty = UpdateProjectRequest {
        title: Some(String::new()),
        ..Default::default()
    };
    assert!(empty.validate().is_err());
}
