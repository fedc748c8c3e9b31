mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{
    CountingHandler, OPERATOR_NS, StaticProbe, config_with, empty_cluster_client,
    empty_handlers, idle_client, set_env_guarded, test_config, unset_env_guarded,
};
use odh_operator::{
    Error, Factory, Handlers, OperatorKind, OperatorState,
    cluster::{OPERATOR_NAMESPACE_ENV, PLATFORM_TYPE_ENV, Platform},
    controller::{datasciencecluster, dscinitialization},
    registry::HandlerKind,
    startup::{
        CLEANUP_TASK, CREATE_DEFAULT_DSC_TASK, CREATE_DEFAULT_DSCI_TASK,
        DISABLE_DSC_CONFIG_ENV,
    },
    webhook::{VALIDATE_DSC_PATH, VALIDATE_DSCI_PATH},
};
use serial_test::serial;
use test_log::test;
use tokio_util::sync::CancellationToken;

fn factory(platform: Platform, handlers: Arc<Handlers>) -> Factory {
    Factory::new(test_config(), handlers)
        .with_client(idle_client())
        .with_probe(Arc::new(StaticProbe::new(platform)))
}

#[test(tokio::test)]
#[serial]
async fn main_operator_sets_up_builtin_reconcilers() {
    let _opt_out = unset_env_guarded(DISABLE_DSC_CONFIG_ENV);

    let mut op = factory(Platform::OpenDataHub, empty_handlers())
        .create_named("main")
        .unwrap();
    assert_eq!(op.kind(), OperatorKind::Main);
    assert_eq!(op.state(), OperatorState::Created);

    op.setup().await.unwrap();
    assert_eq!(op.state(), OperatorState::Ready);

    let mgr = op.manager().expect("manager after setup");
    assert_eq!(
        mgr.controller_names(),
        vec![dscinitialization::CONTROLLER_NAME, datasciencecluster::CONTROLLER_NAME]
    );
    assert_eq!(mgr.task_names(), vec![CREATE_DEFAULT_DSCI_TASK, CLEANUP_TASK]);
    assert_eq!(
        mgr.webhook_paths(),
        &[VALIDATE_DSCI_PATH.to_string(), VALIDATE_DSC_PATH.to_string()]
    );
    assert!(mgr.has_health_checks());
}

#[test(tokio::test)]
#[serial]
async fn setup_detects_platform_from_empty_cluster() {
    let _opt_out = unset_env_guarded(DISABLE_DSC_CONFIG_ENV);
    let _platform = unset_env_guarded(PLATFORM_TYPE_ENV);
    let _ns = set_env_guarded(OPERATOR_NAMESPACE_ENV, OPERATOR_NS);

    let mut op = Factory::new(test_config(), empty_handlers())
        .with_client(empty_cluster_client())
        .create(OperatorKind::Main)
        .unwrap();
    op.setup().await.unwrap();
    assert_eq!(op.state(), OperatorState::Ready);

    // No catalog source or subscription: Open Data Hub, so no default DSC.
    let mgr = op.manager().unwrap();
    assert_eq!(mgr.task_names(), vec![CREATE_DEFAULT_DSCI_TASK, CLEANUP_TASK]);
    assert_eq!(
        mgr.controller_names(),
        vec![dscinitialization::CONTROLLER_NAME, datasciencecluster::CONTROLLER_NAME]
    );
}

#[test(tokio::test)]
#[serial]
async fn managed_platform_also_creates_default_dsc() {
    let _opt_out = unset_env_guarded(DISABLE_DSC_CONFIG_ENV);

    let mut op = factory(Platform::ManagedRhoai, empty_handlers())
        .create(OperatorKind::Main)
        .unwrap();
    op.setup().await.unwrap();

    let tasks = op.manager().unwrap().task_names();
    assert_eq!(
        tasks,
        vec![CREATE_DEFAULT_DSCI_TASK, CREATE_DEFAULT_DSC_TASK, CLEANUP_TASK]
    );
}

#[test(tokio::test)]
#[serial]
async fn opt_out_skips_default_dsci() {
    let _opt_out = set_env_guarded(DISABLE_DSC_CONFIG_ENV, "true");

    let mut op = factory(Platform::OpenDataHub, empty_handlers())
        .create(OperatorKind::Main)
        .unwrap();
    op.setup().await.unwrap();

    assert_eq!(op.manager().unwrap().task_names(), vec![CLEANUP_TASK]);
}

#[test(tokio::test)]
#[serial]
async fn opt_out_value_false_keeps_default_dsci() {
    let _opt_out = set_env_guarded(DISABLE_DSC_CONFIG_ENV, "false");

    let mut op = factory(Platform::OpenDataHub, empty_handlers())
        .create(OperatorKind::Main)
        .unwrap();
    op.setup().await.unwrap();

    assert!(
        op.manager()
            .unwrap()
            .task_names()
            .contains(&CREATE_DEFAULT_DSCI_TASK)
    );
}

#[test(tokio::test)]
#[serial]
async fn handlers_are_initialized_then_wired_in_order() {
    let _opt_out = unset_env_guarded(DISABLE_DSC_CONFIG_ENV);

    let svc = CountingHandler::new("auth");
    let comp = CountingHandler::new("dashboard");
    let (svc_inits, svc_recs) = (svc.inits.clone(), svc.reconcilers.clone());
    let (comp_inits, comp_recs) = (comp.inits.clone(), comp.reconcilers.clone());

    let mut handlers = Handlers::default();
    handlers.services.register(Box::new(svc)).unwrap();
    handlers.components.register(Box::new(comp)).unwrap();

    let mut op = factory(Platform::SelfManagedRhoai, Arc::new(handlers))
        .create(OperatorKind::Main)
        .unwrap();
    op.setup().await.unwrap();

    for counter in [&svc_inits, &svc_recs, &comp_inits, &comp_recs] {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
    assert_eq!(
        op.manager().unwrap().controller_names(),
        vec![
            dscinitialization::CONTROLLER_NAME,
            datasciencecluster::CONTROLLER_NAME,
            "auth",
            "dashboard",
        ]
    );
}

#[test(tokio::test)]
#[serial]
async fn failing_handler_init_aborts_setup() {
    let mut broken = CountingHandler::new("kserve");
    broken.fail_init = true;
    let later = CountingHandler::new("ray");
    let later_inits = later.inits.clone();
    let reconcilers = broken.reconcilers.clone();

    let mut handlers = Handlers::default();
    handlers.components.register(Box::new(broken)).unwrap();
    handlers.components.register(Box::new(later)).unwrap();

    let mut op = factory(Platform::OpenDataHub, Arc::new(handlers))
        .create(OperatorKind::Main)
        .unwrap();
    let err = op.setup().await.unwrap_err();

    match &err {
        Error::HandlerInit(e) => {
            assert_eq!(e.kind, HandlerKind::Component);
            assert_eq!(e.name, "kserve");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("unable to initialize handlers"));
    assert_eq!(later_inits.load(Ordering::SeqCst), 0);
    assert_eq!(reconcilers.load(Ordering::SeqCst), 0);
    assert_eq!(op.state(), OperatorState::Failed);
    assert!(op.manager().is_none());
}

#[test(tokio::test)]
#[serial]
async fn failing_reconciler_creation_aborts_setup() {
    let _opt_out = unset_env_guarded(DISABLE_DSC_CONFIG_ENV);

    let first = CountingHandler::new("dashboard");
    let mut broken = CountingHandler::new("workbenches");
    broken.fail_reconciler = true;
    let last = CountingHandler::new("modelregistry");
    let (first_recs, broken_recs, last_recs) = (
        first.reconcilers.clone(),
        broken.reconcilers.clone(),
        last.reconcilers.clone(),
    );
    let last_inits = last.inits.clone();

    let mut handlers = Handlers::default();
    for h in [first, broken, last] {
        handlers.components.register(Box::new(h)).unwrap();
    }

    let mut op = factory(Platform::OpenDataHub, Arc::new(handlers))
        .create(OperatorKind::Main)
        .unwrap();
    let err = op.setup().await.unwrap_err();

    match &err {
        Error::Reconcilers(e) => {
            assert_eq!(e.kind, HandlerKind::Component);
            assert_eq!(e.name, "workbenches");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("unable to create reconcilers"));
    assert!(err.to_string().contains("workbenches"));
    // Every handler was initialized before any reconciler was built.
    assert_eq!(last_inits.load(Ordering::SeqCst), 1);
    assert_eq!(first_recs.load(Ordering::SeqCst), 1);
    assert_eq!(broken_recs.load(Ordering::SeqCst), 1);
    assert_eq!(last_recs.load(Ordering::SeqCst), 0);
    assert_eq!(op.state(), OperatorState::Failed);
    assert!(op.manager().is_none());
}

#[test(tokio::test)]
#[serial]
async fn unresolved_operator_namespace_fails_cache_policy() {
    let probe = StaticProbe {
        operator_namespace: None,
        ..StaticProbe::new(Platform::OpenDataHub)
    };
    let mut op = Factory::new(test_config(), empty_handlers())
        .with_client(idle_client())
        .with_probe(Arc::new(probe))
        .create(OperatorKind::Main)
        .unwrap();

    let err = op.setup().await.unwrap_err();
    assert!(matches!(err, Error::CachePolicy(_)), "got {err}");
    assert_eq!(op.state(), OperatorState::Failed);
}

#[test(tokio::test)]
#[serial]
async fn setup_runs_only_once() {
    let _opt_out = unset_env_guarded(DISABLE_DSC_CONFIG_ENV);

    let mut op = factory(Platform::OpenDataHub, empty_handlers())
        .create(OperatorKind::Main)
        .unwrap();
    op.setup().await.unwrap();

    let err = op.setup().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(OperatorState::Ready)));
    // The first setup's manager survives.
    assert_eq!(op.state(), OperatorState::Ready);
    assert!(op.manager().is_some());
}

#[test(tokio::test)]
async fn start_before_setup_is_rejected() {
    let mut op = factory(Platform::OpenDataHub, empty_handlers())
        .create(OperatorKind::Main)
        .unwrap();
    let err = op.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(OperatorState::Created)));
}

#[test(tokio::test)]
#[serial]
async fn started_operator_stops_on_cancel() {
    let _opt_out = set_env_guarded(DISABLE_DSC_CONFIG_ENV, "true");

    let mut op = Factory::new(config_with(false), empty_handlers())
        .with_client(idle_client())
        .with_probe(Arc::new(StaticProbe::new(Platform::OpenDataHub)))
        .create(OperatorKind::Main)
        .unwrap();
    op.setup().await.unwrap();
    assert!(op.manager().unwrap().webhook_paths().is_empty());

    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        stop.cancel();
    });
    tokio::time::timeout(std::time::Duration::from_secs(10), op.start(token))
        .await
        .expect("operator did not stop")
        .unwrap();
    assert_eq!(op.state(), OperatorState::Stopped);
}

#[test]
fn cloud_manager_is_not_implemented() {
    let result = Factory::new(test_config(), empty_handlers()).create_named("cloud-manager");
    match result {
        Err(err @ Error::NotImplemented(OperatorKind::CloudManager)) => {
            assert!(err.to_string().contains("cloud-manager"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("cloud-manager should not be constructible"),
    }
}

#[test]
fn unknown_kind_is_rejected() {
    let result = Factory::new(test_config(), empty_handlers()).create_named("bogus");
    match result {
        Err(Error::UnknownKind(tag)) => assert_eq!(tag, "bogus"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bogus kind should not be constructible"),
    }
}

/// Needs a reachable cluster with the operator CRDs installed.
#[test(tokio::test)]
#[serial]
#[ignore]
async fn live_cluster_detection_resolves_platform() {
    let _platform = unset_env_guarded(PLATFORM_TYPE_ENV);
    let _ns = set_env_guarded(OPERATOR_NAMESPACE_ENV, "opendatahub");

    let config = odh_operator::Config::load().await.unwrap();
    let client = kube::Client::try_from(config.kube.clone()).unwrap();
    let info = odh_operator::cluster::ClusterProbe::probe(
        &odh_operator::cluster::KubeClusterProbe::new(client),
    )
    .await
    .unwrap();
    assert!(info.application_namespace.is_some());
}
