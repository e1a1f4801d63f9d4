#[cfg(test)]
mod tests {
    use crate::error::OutputError;
    use crate::types::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_outputs() -> OutputSet {
        OutputSet::from_terraform_json(&json!({
            "front_door_name": { "sensitive": false, "type": "string", "value": "demo-eus-dev-000-fd-002" },
            "instance_count":  { "sensitive": false, "type": "number", "value": 2 },
            "frontend_endpoints": { "sensitive": false, "type": ["map", "string"], "value": {} },
            "storage_account_names": {
                "sensitive": false,
                "type": ["map", "string"],
                "value": { "eastus": "demoeusdev000sa002", "westus": "demowusdev000sa002" }
            },
            "regions": { "sensitive": false, "type": ["list", "string"], "value": ["eastus", "westus"] }
        }))
        .unwrap()
    }

    fn regions(pairs: &[(&str, &str)]) -> RegionMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn scalar_output_is_read() {
        let outputs = sample_outputs();
        assert_eq!(outputs.scalar("front_door_name").unwrap(), "demo-eus-dev-000-fd-002");
        assert_eq!(outputs.scalar("instance_count").unwrap(), "2");
    }

    #[test]
    fn repeated_reads_are_identical() {
        let outputs = sample_outputs();
        let first = outputs.map("storage_account_names").unwrap().clone();
        let second = outputs.map("storage_account_names").unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_output_is_an_error() {
        let outputs = sample_outputs();
        assert_eq!(
            outputs.scalar("web_app_ids"),
            Err(OutputError::MissingOutput { name: "web_app_ids".into() })
        );
        assert!(matches!(outputs.map("nope"), Err(OutputError::MissingOutput { .. })));
    }

    #[test]
    fn wrong_shape_is_reported() {
        let outputs = sample_outputs();
        let err = outputs.map("front_door_name").unwrap_err();
        assert_eq!(
            err,
            OutputError::TypeMismatch {
                name: "front_door_name".into(),
                expected: "map",
                actual: "scalar",
            }
        );
        assert_eq!(outputs.list("regions").unwrap(), ["eastus", "westus"]);
    }

    #[test]
    fn empty_map_output_is_not_an_error() {
        let outputs = sample_outputs();
        assert!(outputs.map("frontend_endpoints").unwrap().is_empty());
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(matches!(
            OutputSet::from_terraform_json(&json!(["not", "an", "object"])),
            Err(OutputError::Malformed(_))
        ));
        assert!(matches!(
            OutputSet::from_terraform_json(&json!({ "x": { "type": "string" } })),
            Err(OutputError::Malformed(_))
        ));
    }

    #[test]
    fn regions_pair_when_keys_match() {
        let outputs = sample_outputs();
        let expected = regions(&[
            ("eastus", "demo-eus-dev-000-rg-002"),
            ("westus", "demo-wus-dev-000-rg-002"),
        ]);
        let actual = outputs.map("storage_account_names").unwrap();
        let pairs = pair_regions("storage_account_names", &expected, actual).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].region, "eastus");
        assert_eq!(pairs[0].expected, "demo-eus-dev-000-rg-002");
        assert_eq!(pairs[0].actual, "demoeusdev000sa002");
    }

    #[test]
    fn missing_region_is_a_lookup_failure() {
        let expected = regions(&[
            ("eastus", "demo-eus-dev-000-rg-002"),
            ("westus", "demo-wus-dev-000-rg-002"),
        ]);
        let actual: BTreeMap<String, String> =
            regions(&[("eastus", "demoeusdev000sa002")]);
        assert_eq!(
            pair_regions("storage_account_names", &expected, &actual),
            Err(OutputError::MissingKey {
                output: "storage_account_names".into(),
                key: "westus".into(),
            })
        );
    }

    #[test]
    fn extra_region_is_a_lookup_failure() {
        let expected = regions(&[("eastus", "demo-eus-dev-000-rg-002")]);
        let actual = regions(&[("eastus", "a"), ("centralus", "b")]);
        assert!(matches!(
            pair_regions("web_app_names", &expected, &actual),
            Err(OutputError::UnexpectedKey { key, .. }) if key == "centralus"
        ));
    }

    #[test]
    fn identity_display_mentions_group() {
        let id = ResourceIdentity::new(
            ResourceKind::StorageAccount,
            "demoeusdev000sa002",
            "demo-eus-dev-000-rg-002",
            "",
        );
        assert_eq!(
            id.to_string(),
            "storage account 'demoeusdev000sa002' in resource group 'demo-eus-dev-000-rg-002'"
        );
        let rg = ResourceIdentity::resource_group("demo-eus-dev-000-rg-002", "");
        assert_eq!(rg.to_string(), "resource group 'demo-eus-dev-000-rg-002'");
    }
}

#[cfg(test)]
mod retry_tests {
    use crate::suite::RetryPolicy;

    #[test]
    fn default_policy_matches_transient_errors() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        let log = "Error: Failed to install provider\n\nError while installing hashicorp/azurerm: \
                   net/http: TLS handshake timeout";
        assert_eq!(policy.retryable_match(log), Some("TLS handshake timed out."));
    }

    #[test]
    fn non_transient_error_is_not_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.retryable_match("Error: A resource with the ID already exists"),
            None
        );
    }
}
