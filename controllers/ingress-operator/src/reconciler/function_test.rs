//! Unit tests for the Function sync handler

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crds::Function;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::Service;

    use crate::config::DeploymentConfig;
    use crate::error::ReconcileError;
    use crate::reconciler::{FunctionSync, SyncHandler, SyncOutcome};
    use crate::snapshot::FUNCTION_SNAPSHOT;
    use crate::synthesizer::workload::FunctionFactory;
    use crate::test_utils::*;

    struct Harness {
        functions: TestCache<Function>,
        deployments: TestCache<Deployment>,
        services: TestCache<Service>,
        api: MockWorkloadApi,
        events: RecordingEventPublisher,
        sync: FunctionSync,
    }

    fn harness() -> Harness {
        let functions = TestCache::new();
        let deployments = TestCache::new();
        let services = TestCache::new();
        let api = MockWorkloadApi::new();
        let events = RecordingEventPublisher::new();
        let sync = FunctionSync::new(
            functions.store(),
            deployments.store(),
            services.store(),
            FunctionFactory::new(DeploymentConfig::default()),
            Arc::new(api.clone()),
            Arc::new(events.clone()),
        );
        Harness {
            functions,
            deployments,
            services,
            api,
            events,
            sync,
        }
    }

    fn nodeinfo() -> Function {
        create_test_function("nodeinfo", "openfaas-fn")
    }

    /// Create the workload for `function` and feed it back into the caches
    async fn converged(h: &Harness, function: Function) {
        h.functions.apply(function);
        assert_eq!(h.sync.sync("openfaas-fn/nodeinfo").await.unwrap(), SyncOutcome::Created);
        h.deployments.apply(h.api.created_deployments().pop().unwrap());
        h.services.apply(h.api.created_services().pop().unwrap());
    }

    #[tokio::test]
    async fn test_creates_deployment_and_service() {
        let h = harness();
        converged(&h, nodeinfo()).await;

        assert_eq!(h.api.created_deployments().len(), 1);
        assert_eq!(h.api.created_services().len(), 1);
        let service = &h.api.created_services()[0];
        assert_eq!(service.metadata.name.as_deref(), Some("nodeinfo"));
        assert_eq!(service.metadata.owner_references.as_ref().unwrap()[0].kind, "Function");
        assert_eq!(h.events.reasons(), vec!["Synced"]);
    }

    #[tokio::test]
    async fn test_second_sync_writes_nothing() {
        let h = harness();
        converged(&h, nodeinfo()).await;

        assert_eq!(h.sync.sync("openfaas-fn/nodeinfo").await.unwrap(), SyncOutcome::Unchanged);
        assert_eq!(h.api.writes(), 2);
    }

    #[tokio::test]
    async fn test_missing_service_is_recreated_alone() {
        let h = harness();
        converged(&h, nodeinfo()).await;
        let service = h.services.store().get("openfaas-fn", "nodeinfo").unwrap();
        h.services.remove(&service);

        assert_eq!(h.sync.sync("openfaas-fn/nodeinfo").await.unwrap(), SyncOutcome::Created);
        assert_eq!(h.api.created_services().len(), 2);
        assert_eq!(h.api.created_deployments().len(), 1);
        assert!(h.api.replaced_deployments().is_empty());
    }

    #[tokio::test]
    async fn test_spec_change_replaces_deployment_only() {
        let h = harness();
        converged(&h, nodeinfo()).await;

        let mut function = nodeinfo();
        function.spec.image = "functions/nodeinfo:v2".to_string();
        h.functions.apply(function);

        assert_eq!(h.sync.sync("openfaas-fn/nodeinfo").await.unwrap(), SyncOutcome::Updated);
        let replaced = h.api.replaced_deployments();
        assert_eq!(replaced.len(), 1);
        let snapshot = &replaced[0].metadata.annotations.as_ref().unwrap()[FUNCTION_SNAPSHOT];
        assert!(snapshot.contains("functions/nodeinfo:v2"));
        assert_eq!(h.api.created_services().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_is_rejected() {
        let h = harness();
        let factory = FunctionFactory::default();
        let mut stale = factory.make_deployment(&nodeinfo()).unwrap();
        stale.metadata.name = Some("nodeinfo-v2".to_string());
        h.deployments.apply(stale);

        let mut renamed = create_test_function("nodeinfo-v2", "openfaas-fn");
        renamed.spec.image = "functions/nodeinfo:v2".to_string();
        h.functions.apply(renamed);

        let err = h.sync.sync("openfaas-fn/nodeinfo-v2").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Rename { .. }));
        assert_eq!(h.api.writes(), 0);
        assert_eq!(h.events.reasons(), vec!["RenameRejected"]);
    }

    #[tokio::test]
    async fn test_foreign_deployment_is_not_taken_over() {
        let h = harness();
        let mut foreign = FunctionFactory::default().make_deployment(&nodeinfo()).unwrap();
        foreign.metadata.owner_references = None;
        foreign.metadata.annotations = None;
        h.deployments.apply(foreign);
        h.functions.apply(nodeinfo());

        let err = h.sync.sync("openfaas-fn/nodeinfo").await.unwrap_err();
        assert!(matches!(err, ReconcileError::ResourceExists { kind: "Function", .. }));
        assert!(!err.is_retriable());
        assert_eq!(h.api.writes(), 0);
        assert!(h.api.replaced_deployments().is_empty());

        let events = h.events.events();
        assert_eq!(h.events.reasons(), vec!["ErrResourceExists"]);
        assert!(events[0].warning);
        assert!(events[0].note.as_deref().unwrap().contains("not managed by Function nodeinfo"));
    }

    #[tokio::test]
    async fn test_write_failure_is_retriable() {
        let h = harness();
        h.functions.apply(nodeinfo());
        h.api.fail_writes(true);

        let err = h.sync.sync("openfaas-fn/nodeinfo").await.unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(h.events.reasons(), vec!["SyncFailed"]);
        assert!(h.events.events()[0].warning);
    }

    #[tokio::test]
    async fn test_missing_function() {
        let h = harness();
        assert_eq!(h.sync.sync("openfaas-fn/nodeinfo").await.unwrap(), SyncOutcome::Missing);
        assert_eq!(h.api.writes(), 0);
    }
}
