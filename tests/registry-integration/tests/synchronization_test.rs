//! 目录同步的端到端测试

mod common;

use common::{eventually, init_logging, publish, CallRecorder, Greeter, ModuleGreeter, PlainGreeter};
use infrastructure_common::{ComponentProperties, RuntimeSettings};
use registry_abstractions::{
    BackingProvider, CatalogEventKind, ComponentRegistry, ContractType, RegistrationRequest,
    RegistrationState,
};
use registry_composition::RegistryRuntime;
use std::sync::atomic::Ordering;
use std::sync::Arc;

async fn running_runtime() -> anyhow::Result<RegistryRuntime> {
    init_logging();
    let runtime = RegistryRuntime::builder()
        .with_settings(RuntimeSettings::default())
        .build()
        .await?;
    runtime.start().await?;
    Ok(runtime)
}

fn greeter_contract() -> ContractType {
    ContractType::of::<dyn Greeter>()
}

#[tokio::test]
async fn test_out_of_band_publication_is_adopted_as_proxy() -> anyhow::Result<()> {
    let runtime = running_runtime().await?;
    let catalog = Arc::clone(runtime.catalog().expect("默认内存目录"));
    let recorder = Arc::new(CallRecorder::default());
    runtime
        .registry()
        .register(RegistrationRequest::new(Arc::clone(&recorder)))?;

    let raw = publish(
        &catalog,
        "greetings",
        ModuleGreeter::new("hello"),
        ComponentProperties::new().with("component.priority", 4).with("lang", "en"),
    );

    let registry = runtime.registry().clone();
    assert!(eventually(|| registry.registration_by_handle(raw).is_some()).await);

    let registration = registry.registration_by_handle(raw).expect("已收编");
    assert!(registration.is_proxied());
    assert_eq!(registration.priority(), 4);
    assert_eq!(registration.source_handle(), Some(raw));

    let greeter = registry.find::<dyn Greeter>(None)?;
    assert_eq!(greeter.greet("world")?, "hello world");
    assert_eq!(recorder.calls(), vec!["Component::on_activate", "Greeter::greet"]);

    let visible = catalog.query(&greeter_contract(), Some("(lang=en)"))?;
    assert_eq!(visible.len(), 1);
    assert!(visible[0].is_proxy());
    assert_eq!(catalog.len(), 3);

    runtime.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_initial_scan_adopts_existing_publications() -> anyhow::Result<()> {
    init_logging();
    let runtime = RegistryRuntime::builder()
        .with_settings(RuntimeSettings::default())
        .build()
        .await?;
    let catalog = Arc::clone(runtime.catalog().expect("默认内存目录"));
    let raw = publish(&catalog, "early", ModuleGreeter::new("early"), ComponentProperties::new());

    runtime.start().await?;
    assert!(runtime.registry().registration_by_handle(raw).is_some());
    assert_eq!(runtime.metrics().await.synchronizer.map(|stats| stats.adopted), Some(1));

    runtime.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_module_stop_removes_adopted_registration() -> anyhow::Result<()> {
    let runtime = running_runtime().await?;
    let catalog = Arc::clone(runtime.catalog().expect("默认内存目录"));
    let component = ModuleGreeter::new("bye");
    let raw = publish(&catalog, "farewell", Arc::clone(&component), ComponentProperties::new());

    let registry = runtime.registry().clone();
    assert!(eventually(|| registry.len() == 1).await);
    let registration = registry.registration_by_handle(raw).expect("已收编");

    assert_eq!(catalog.stop_module("farewell")?, 1);
    assert!(eventually(|| registry.is_empty() && catalog.is_empty()).await);
    assert_eq!(registration.state(), RegistrationState::Deactivated);
    assert_eq!(component.deactivations.load(Ordering::SeqCst), 1);
    assert!(registry.find::<dyn Greeter>(None).is_err());

    runtime.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_modified_publication_is_refreshed() -> anyhow::Result<()> {
    let runtime = running_runtime().await?;
    let catalog = Arc::clone(runtime.catalog().expect("默认内存目录"));
    let raw = publish(
        &catalog,
        "greetings",
        ModuleGreeter::new("hi"),
        ComponentProperties::new().with("lang", "en"),
    );

    let registry = runtime.registry().clone();
    assert!(eventually(|| registry.registration_by_handle(raw).is_some()).await);
    let before = registry.registration_by_handle(raw).expect("已收编");

    catalog.update_properties(
        raw,
        ComponentProperties::new().with("lang", "fr").with("component.priority", 9),
    )?;
    assert!(
        eventually(|| registry
            .registration_by_handle(raw)
            .is_some_and(|current| current.id() != before.id()
                && current.state() == RegistrationState::Modified))
        .await
    );

    let after = registry.registration_by_handle(raw).expect("已重建");
    assert_eq!(after.state(), RegistrationState::Modified);
    assert_eq!(after.priority(), 9);
    assert_eq!(after.properties().get_text("lang").as_deref(), Some("fr"));
    assert_eq!(before.state(), RegistrationState::Deactivated);
    assert_eq!(registry.len(), 1);

    runtime.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_plain_publication_is_left_untouched() -> anyhow::Result<()> {
    let runtime = running_runtime().await?;
    let catalog = Arc::clone(runtime.catalog().expect("默认内存目录"));
    publish(&catalog, "plain", Arc::new(PlainGreeter), ComponentProperties::new());
    let marker = publish(&catalog, "marker", ModuleGreeter::new("marker"), ComponentProperties::new());

    let registry = runtime.registry().clone();
    assert!(eventually(|| registry.registration_by_handle(marker).is_some()).await);

    assert_eq!(registry.len(), 1);
    let visible = catalog.query(&greeter_contract(), None)?;
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().any(|entry| !entry.is_proxy()));

    runtime.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_other_subscribers_only_see_proxies() -> anyhow::Result<()> {
    let runtime = running_runtime().await?;
    let catalog = Arc::clone(runtime.catalog().expect("默认内存目录"));
    let mut observer = catalog.subscribe()?;

    let raw = publish(&catalog, "greetings", ModuleGreeter::new("hey"), ComponentProperties::new());
    let registry = runtime.registry().clone();
    assert!(eventually(|| registry.registration_by_handle(raw).is_some()).await);

    let event = observer.events.recv().await.expect("代理发布事件");
    assert_eq!(event.kind, CatalogEventKind::Registered);
    assert!(event.proxy);
    assert_ne!(event.backing_handle, raw);
    assert!(observer.events.try_recv().is_err());

    runtime.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_runtime_stop_deactivates_components() -> anyhow::Result<()> {
    let runtime = running_runtime().await?;
    let component = ModuleGreeter::new("app");
    runtime
        .registry()
        .register(RegistrationRequest::new(Arc::clone(&component)))?;

    let metrics = runtime.metrics().await;
    assert_eq!(metrics.registered_components_count, 1);
    let json = serde_json::to_value(&metrics)?;
    assert_eq!(json["registered_components_count"], 1);

    runtime.stop().await?;
    assert!(runtime.registry().is_empty());
    assert_eq!(component.deactivations.load(Ordering::SeqCst), 1);
    assert!(runtime.provider().query(&greeter_contract(), None)?.is_empty());
    Ok(())
}
