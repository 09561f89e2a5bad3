//! Unit tests for catalog-ops.
//!
//! These tests run without a Kubernetes cluster and exercise the public
//! building blocks of each subcommand.

mod crd_tests {
    use catalog_ops::crd::{CRD_COUNT, CatalogKind, catalog_crds, is_catalog_crd};

    #[test]
    fn test_kind_lookup_round_trips() {
        for kind in CatalogKind::ALL {
            assert_eq!(CatalogKind::from_kind(kind.kind()), Some(kind));
            assert_eq!(CatalogKind::from_plural(kind.plural()), Some(kind));
        }
        assert_eq!(CatalogKind::from_kind("Pod"), None);
    }

    #[test]
    fn test_kinds_sort_in_processing_order() {
        let mut sorted = CatalogKind::ALL;
        sorted.reverse();
        sorted.sort();
        assert_eq!(sorted, CatalogKind::ALL);
    }

    #[test]
    fn test_cluster_scoped_kinds() {
        let cluster_scoped: Vec<_> = CatalogKind::ALL
            .into_iter()
            .filter(|kind| !kind.is_namespaced())
            .collect();
        assert_eq!(
            cluster_scoped,
            vec![
                CatalogKind::ClusterServiceBroker,
                CatalogKind::ClusterServiceClass,
                CatalogKind::ClusterServicePlan,
            ]
        );
    }

    #[test]
    fn test_catalog_crd_names() {
        assert!(is_catalog_crd("serviceinstances.servicecatalog.k8s.io"));
        assert!(is_catalog_crd("clusterserviceplans.servicecatalog.k8s.io"));
        assert!(!is_catalog_crd("serviceinstances.example.com"));
        assert!(!is_catalog_crd("certificates.cert-manager.io"));
    }

    #[test]
    fn test_release_label_on_generated_crds() {
        let crds = catalog_crds(Some("catalog"));
        assert_eq!(crds.len(), CRD_COUNT);
        for crd in &crds {
            let labels = crd.metadata.labels.as_ref().expect("labels");
            assert_eq!(labels.get("release").map(String::as_str), Some("catalog"));
            assert_eq!(crd.spec.group, "servicecatalog.k8s.io");
        }

        let unlabelled = catalog_crds(None);
        assert!(
            unlabelled
                .iter()
                .all(|crd| crd.metadata.labels.as_ref().is_none_or(|l| !l.contains_key("release")))
        );
    }
}

mod config_tests {
    use catalog_ops::config::{Cli, Command, MigrationAction};
    use clap::Parser;

    #[test]
    fn test_cleaner_flags() {
        let cli = Cli::try_parse_from([
            "catalog-ops",
            "cleaner",
            "--cleaner-command",
            "remove-crd",
            "--release-name",
            "catalog",
            "--service-catalog-namespace",
            "catalog",
            "--controller-manager-deployment",
            "catalog-controller-manager",
        ])
        .expect("parse");
        let Command::Cleaner(opts) = cli.command else {
            panic!("expected cleaner subcommand");
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_backup_with_blocker_needs_image() {
        let cli = Cli::try_parse_from([
            "catalog-ops",
            "migration",
            "--action",
            "backup",
            "--storage-path",
            "/tmp/backup",
            "--service-catalog-namespace",
            "catalog",
            "--controller-manager-deployment",
            "cm",
        ])
        .expect("parse");
        let Command::Migration(opts) = cli.command else {
            panic!("expected migration subcommand");
        };
        assert_eq!(opts.action, MigrationAction::Backup);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_backup_without_blocker_needs_no_image() {
        let cli = Cli::try_parse_from([
            "catalog-ops",
            "migration",
            "--action",
            "backup",
            "--storage-path",
            "/tmp/backup",
            "--service-catalog-namespace",
            "catalog",
            "--controller-manager-deployment",
            "cm",
            "--enable-blocker",
            "false",
        ])
        .expect("parse");
        let Command::Migration(opts) = cli.command else {
            panic!("expected migration subcommand");
        };
        assert!(!opts.enable_blocker);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_webhook_ports_must_differ() {
        let cli = Cli::try_parse_from([
            "catalog-ops",
            "webhook",
            "--port",
            "9000",
            "--healthz-port",
            "9000",
        ])
        .expect("parse");
        let Command::Webhook(opts) = cli.command else {
            panic!("expected webhook subcommand");
        };
        assert!(opts.validate().is_err());
    }
}

mod backup_tests {
    use std::path::PathBuf;

    use catalog_ops::crd::CatalogKind;
    use catalog_ops::migration::{backup_file, prepare_for_restore};
    use kube::api::ObjectMeta;
    use kube::core::DynamicObject;

    fn object(namespace: Option<&str>, name: &str) -> DynamicObject {
        let mut object = DynamicObject::new(name, &CatalogKind::ServiceInstance.api_resource());
        object.metadata.namespace = namespace.map(str::to_string);
        object
    }

    #[test]
    fn test_backup_file_layout() {
        assert_eq!(
            backup_file(CatalogKind::ServiceInstance, &object(Some("app"), "db")),
            PathBuf::from("serviceinstances/app.db.yaml")
        );
        assert_eq!(
            backup_file(CatalogKind::ClusterServiceBroker, &object(None, "ups")),
            PathBuf::from("clusterservicebrokers/ups.yaml")
        );
    }

    #[test]
    fn test_prepare_for_restore_keeps_identity() {
        let mut object = object(Some("app"), "db");
        object.metadata = ObjectMeta {
            resource_version: Some("42".to_string()),
            uid: Some("8c1a".to_string()),
            generation: Some(3),
            finalizers: Some(vec!["kubernetes-incubator/service-catalog".to_string()]),
            ..object.metadata
        };

        prepare_for_restore(&mut object);

        assert_eq!(object.metadata.name.as_deref(), Some("db"));
        assert_eq!(object.metadata.namespace.as_deref(), Some("app"));
        assert!(object.metadata.resource_version.is_none());
        assert!(object.metadata.uid.is_none());
        assert!(object.metadata.generation.is_none());
        assert_eq!(object.metadata.finalizers.map(|f| f.len()), Some(1));
    }
}

mod finalizer_tests {
    use catalog_ops::cleaner::without_catalog_finalizer;
    use catalog_ops::crd::{CatalogKind, FINALIZER};
    use kube::core::DynamicObject;

    #[test]
    fn test_only_catalog_finalizer_is_dropped() {
        let mut object = DynamicObject::new("db", &CatalogKind::ServiceInstance.api_resource());
        object.metadata.finalizers = Some(vec![
            FINALIZER.to_string(),
            "example.com/keep".to_string(),
        ]);
        assert_eq!(without_catalog_finalizer(&object), vec!["example.com/keep"]);
    }
}

mod blocker_tests {
    use catalog_ops::config::DEFAULT_BLOCKER_NAME;
    use catalog_ops::migration::blocker::{BlockerKind, BlockerObject, blocker_objects};
    use catalog_ops::webhooks::blocker::{REJECT_CHANGES_PATH, reject_changes};
    use catalog_ops::webhooks::{AdmissionReview, Request};
    use kube::core::DynamicObject;
    use serde_json::json;

    #[test]
    fn test_objects_are_created_in_dependency_order() {
        let objects = blocker_objects(DEFAULT_BLOCKER_NAME, "catalog", "catalog-ops:v1")
            .expect("blocker objects");
        let kinds: Vec<BlockerKind> = objects.iter().map(BlockerObject::kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockerKind::ServiceAccount,
                BlockerKind::Secret,
                BlockerKind::Pod,
                BlockerKind::Service,
                BlockerKind::WebhookConfiguration,
            ]
        );
    }

    #[test]
    fn test_webhook_points_at_blocker_service() {
        let objects = blocker_objects("blocker", "catalog", "catalog-ops:v1").expect("objects");
        let Some(BlockerObject::WebhookConfiguration(config)) = objects.last() else {
            panic!("webhook configuration must be created last");
        };
        let webhooks = config.webhooks.as_ref().expect("webhooks");
        let service = webhooks
            .first()
            .and_then(|w| w.client_config.service.as_ref())
            .expect("service reference");
        assert_eq!(service.name, "blocker");
        assert_eq!(service.namespace, "catalog");
        assert_eq!(service.path.as_deref(), Some(REJECT_CHANGES_PATH));
    }

    fn request(operation: &str) -> Request {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "5e3d1b0c-1111-4c5a-9a1e-2f7a3c9d0b11",
                "kind": {"group": "servicecatalog.k8s.io", "version": "v1beta1", "kind": "ServiceBinding"},
                "resource": {"group": "servicecatalog.k8s.io", "version": "v1beta1", "resource": "servicebindings"},
                "name": "db-binding",
                "namespace": "app",
                "operation": operation,
                "userInfo": {"username": "admin"},
                "object": null,
                "oldObject": null,
                "dryRun": false
            }
        }))
        .expect("review");
        review.try_into().expect("request")
    }

    #[test]
    fn test_blocker_denies_writes() {
        for operation in ["CREATE", "UPDATE", "DELETE"] {
            assert!(!reject_changes(&request(operation)).is_allowed(), "{}", operation);
        }
        assert!(reject_changes(&request("CONNECT")).is_allowed());
    }
}

mod certs_tests {
    use catalog_ops::migration::certs::{
        generate_certificate_authority, generate_signed_certificate,
    };

    #[test]
    fn test_leaf_is_pem() {
        let ca = generate_certificate_authority("blocker-ca", 30).expect("ca");
        let leaf = generate_signed_certificate("blocker", &["blocker.catalog.svc".to_string()], 30, &ca)
            .expect("leaf");
        assert!(leaf.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(leaf.key_pem.contains("PRIVATE KEY"));
    }
}
