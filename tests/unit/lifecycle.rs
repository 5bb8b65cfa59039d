//! Unit tests for the lifecycle trigger wire format

use serde_json::json;

use pg_bootstrap::model::{
    ApplicationConnectionInfo, InitializationOutcome, LifecycleEvent, LifecycleFailure,
    LifecycleResponse, RequestType, ResourceProperties,
};

fn connection() -> ApplicationConnectionInfo {
    ApplicationConnectionInfo {
        host: "cluster.internal".to_string(),
        port: 5432,
        primary_database_name: "main".to_string(),
        secondary_database_name: "pgvector".to_string(),
    }
}

mod events {
    use super::*;

    #[test]
    fn test_create_event_ignores_unknown_keys() {
        let event: LifecycleEvent = serde_json::from_value(json!({
            "RequestType": "Create",
            "RequestId": "4b2d1c0e",
            "ResourceProperties": {
                "ServiceToken": "arn:example:function:db-init"
            }
        }))
        .unwrap();

        assert_eq!(event.request_type(), RequestType::Create);
        assert_eq!(event.properties(), &ResourceProperties::default());
    }

    #[test]
    fn test_update_event_carries_old_properties() {
        let event: LifecycleEvent = serde_json::from_value(json!({
            "RequestType": "Update",
            "ResourceProperties": { "SecondaryDatabase": "embeddings" },
            "OldResourceProperties": { "SecondaryDatabase": "pgvector" }
        }))
        .unwrap();

        match event {
            LifecycleEvent::Update {
                properties,
                old_properties,
            } => {
                assert_eq!(properties.secondary_database.as_deref(), Some("embeddings"));
                assert_eq!(old_properties.secondary_database.as_deref(), Some("pgvector"));
            }
            other => panic!("expected Update, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_event_without_properties() {
        let event: LifecycleEvent =
            serde_json::from_value(json!({ "RequestType": "Delete" })).unwrap();
        assert_eq!(event.request_type(), RequestType::Delete);
    }

    #[test]
    fn test_missing_request_type_defaults_to_create() {
        let event: LifecycleEvent = serde_json::from_value(json!({
            "ResourceProperties": { "SecondaryDatabase": "embeddings" }
        }))
        .unwrap();

        assert_eq!(event.request_type(), RequestType::Create);
        assert_eq!(
            event.properties().secondary_database.as_deref(),
            Some("embeddings")
        );
    }

    #[test]
    fn test_serialized_event_reads_back() {
        let event = LifecycleEvent::Update {
            properties: ResourceProperties {
                secondary_database: Some("embeddings".to_string()),
                extensions: None,
            },
            old_properties: ResourceProperties::default(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["RequestType"], "Update");
        let parsed: LifecycleEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_unknown_request_type_rejected() {
        let result: Result<LifecycleEvent, _> =
            serde_json::from_value(json!({ "RequestType": "Rollback" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_extension_override_list() {
        let event: LifecycleEvent = serde_json::from_value(json!({
            "RequestType": "Create",
            "ResourceProperties": { "Extensions": ["vector", "pg_trgm"] }
        }))
        .unwrap();
        assert_eq!(
            event.properties().extensions,
            Some(vec!["vector".to_string(), "pg_trgm".to_string()])
        );
    }
}

mod responses {
    use super::*;

    #[test]
    fn test_success_response_shape() {
        let outcome = InitializationOutcome::success(
            true,
            vec!["uuid-ossp".to_string(), "vector".to_string()],
        );
        let response = LifecycleResponse::from_outcome(&outcome, Some(connection())).unwrap();

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "PhysicalResourceId": "db-init",
                "Data": {
                    "Status": "Success",
                    "Extensions": ["uuid-ossp", "vector"],
                    "DatabaseCreated": true,
                    "Connection": {
                        "host": "cluster.internal",
                        "port": 5432,
                        "primaryDatabaseName": "main",
                        "secondaryDatabaseName": "pgvector"
                    }
                }
            })
        );
    }

    #[test]
    fn test_skipped_response_reports_deleted() {
        let response =
            LifecycleResponse::from_outcome(&InitializationOutcome::skipped(), Some(connection()))
                .unwrap();

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "PhysicalResourceId": "db-init",
                "Data": { "Status": "Deleted" }
            })
        );
    }

    #[test]
    fn test_failure_shape() {
        let failure = LifecycleFailure::new("connection refused");
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({ "Status": "FAILED", "Reason": "connection refused" })
        );
    }
}
