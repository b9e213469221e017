use async_trait::async_trait;
use serial_gate::core::PortChooser;
use serial_gate::{
    ById, Filter, PortDescriptor, PortEvent, PortId, PortInfo, PortStatus, SerialAccess,
    SerialError, SerialOptions, SerialPort, TomlConfig, VirtualTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn scenario_transport() -> Arc<VirtualTransport> {
    let transport = Arc::new(VirtualTransport::new());
    transport.attach_loopback(PortDescriptor::new("A", PortInfo::usb(0x1, 0x2)));
    transport.attach_loopback(PortDescriptor::new(
        "B",
        PortInfo {
            usb_vendor_id: Some(0x3),
            usb_product_id: None,
        },
    ));
    transport
}

fn ids(ports: &[SerialPort]) -> Vec<String> {
    ports.iter().map(|p| p.id().to_string()).collect()
}

async fn wait_for_event(
    events: &mut broadcast::Receiver<PortEvent>,
    expected: PortEvent,
) {
    timeout(WAIT, async {
        loop {
            if events.recv().await.unwrap() == expected {
                return;
            }
        }
    })
    .await
    .unwrap();
}

struct Decline;

#[async_trait]
impl PortChooser for Decline {
    async fn choose(&self, _candidates: &[PortDescriptor]) -> Option<PortId> {
        None
    }
}

#[tokio::test]
async fn test_scenario_resolve_open_reopen() {
    let access = SerialAccess::start(scenario_transport()).await.unwrap();

    // Grant both ports, then negotiate against the accessible set.
    access
        .request_port_with(&[], &ById(PortId::new("A")))
        .await
        .unwrap();
    access
        .request_port_with(&[], &ById(PortId::new("B")))
        .await
        .unwrap();

    assert_eq!(ids(&access.resolve(&[Filter::vendor(0x1)])), vec!["A"]);
    assert_eq!(ids(&access.resolve(&[])), vec!["A", "B"]);

    let a = access.accessible_port(&PortId::new("A")).unwrap();
    let session = a.open(SerialOptions::new(9600)).await.unwrap();
    assert!(matches!(
        a.open(SerialOptions::new(9600)).await,
        Err(SerialError::AlreadyOpen { .. })
    ));

    session.close().await.unwrap();
    let reopened = a.open(SerialOptions::new(9600)).await.unwrap();
    assert_eq!(a.status(), PortStatus::Open);
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_request_port_filters_and_grants() {
    let access = SerialAccess::start(scenario_transport()).await.unwrap();
    assert!(access.get_accessible_ports().is_empty());

    let port = access.request_port(&[Filter::vendor(0x3)]).await.unwrap();
    assert_eq!(port.id(), &PortId::new("B"));
    assert_eq!(port.status(), PortStatus::Available);

    let accessible = access.get_accessible_ports();
    assert_eq!(accessible.len(), 1);
    assert_eq!(accessible[0].id(), &PortId::new("B"));

    // Requesting the same port again is a no-op grant.
    access.request_port(&[Filter::vendor(0x3)]).await.unwrap();
    assert_eq!(access.get_accessible_ports().len(), 1);
}

#[tokio::test]
async fn test_request_port_no_match() {
    let access = SerialAccess::start(scenario_transport()).await.unwrap();

    let result = access
        .request_port(&[Filter::vendor_product(0x1, 0x9)])
        .await;
    assert!(matches!(result, Err(SerialError::NoMatch)));

    let empty = SerialAccess::start(Arc::new(VirtualTransport::new()))
        .await
        .unwrap();
    assert!(matches!(
        empty.request_port(&[]).await,
        Err(SerialError::NoMatch)
    ));
    assert!(empty.get_accessible_ports().is_empty());
}

#[tokio::test]
async fn test_chooser_override_and_decline() {
    let access = SerialAccess::start(scenario_transport()).await.unwrap();

    let port = access
        .request_port_with(&[], &ById(PortId::new("B")))
        .await
        .unwrap();
    assert_eq!(port.id(), &PortId::new("B"));

    let declined = access.request_port_with(&[], &Decline).await;
    assert!(matches!(declined, Err(SerialError::NoMatch)));

    // A chooser cannot pick outside the negotiated candidates.
    let outside = access
        .request_port_with(&[Filter::vendor(0x1)], &ById(PortId::new("B")))
        .await;
    assert!(matches!(outside, Err(SerialError::NoMatch)));
}

#[tokio::test]
async fn test_configured_chooser() {
    let access = SerialAccess::with_chooser(scenario_transport(), Arc::new(Decline))
        .await
        .unwrap();
    assert!(matches!(
        access.request_port(&[]).await,
        Err(SerialError::NoMatch)
    ));
}

#[tokio::test]
async fn test_hotplug_attach_and_detach() {
    let transport = Arc::new(VirtualTransport::new());
    let access = SerialAccess::start(transport.clone()).await.unwrap();
    let mut events = access.subscribe();

    let _device = transport.attach(PortDescriptor::new("late", PortInfo::usb(0xaa, 0xbb)));
    wait_for_event(
        &mut events,
        PortEvent::Attached(PortDescriptor::new("late", PortInfo::usb(0xaa, 0xbb))),
    )
    .await;

    let port = access.request_port(&[Filter::vendor(0xaa)]).await.unwrap();
    assert_eq!(port.id(), &PortId::new("late"));

    transport.detach(&PortId::new("late"));
    wait_for_event(&mut events, PortEvent::Detached(PortId::new("late"))).await;

    assert_eq!(port.status(), PortStatus::Unavailable);
    assert!(access.get_accessible_ports().is_empty());
    assert!(matches!(
        port.open(SerialOptions::default()).await,
        Err(SerialError::Unavailable { .. })
    ));
}

#[tokio::test]
async fn test_other_sessions_survive_detach() {
    let transport = scenario_transport();
    let access = SerialAccess::start(transport.clone()).await.unwrap();
    let mut events = access.subscribe();

    let a = access
        .request_port_with(&[], &ById(PortId::new("A")))
        .await
        .unwrap();
    let b = access
        .request_port_with(&[], &ById(PortId::new("B")))
        .await
        .unwrap();
    let session_a = a.open(SerialOptions::default()).await.unwrap();
    let session_b = b.open(SerialOptions::default()).await.unwrap();

    transport.detach(&PortId::new("A"));
    wait_for_event(&mut events, PortEvent::Detached(PortId::new("A"))).await;

    assert!(!session_a.is_open());
    assert!(session_b.is_open());

    session_b.write(b"ping").await.unwrap();
    let mut echoed = Vec::new();
    while echoed.len() < 4 {
        let chunk = timeout(WAIT, session_b.read()).await.unwrap().unwrap().unwrap();
        echoed.extend_from_slice(&chunk);
    }
    assert_eq!(echoed, b"ping");
}

#[tokio::test]
async fn test_demo_manifest_loopback() {
    let transport = Arc::new(VirtualTransport::new());
    TomlConfig::demo().attach_devices(&transport).unwrap();
    let access = SerialAccess::start(transport).await.unwrap();

    let port = access
        .request_port(&[Filter::vendor_product(0x1a86, 0x7523)])
        .await
        .unwrap();
    assert_eq!(port.id(), &PortId::new("ttyUSB0"));

    let session = port.open(SerialOptions::new(115_200)).await.unwrap();
    session.write(&[0xde, 0xad, 0xbe, 0xef]).await.unwrap();

    let mut echoed = Vec::new();
    while echoed.len() < 4 {
        let chunk = timeout(WAIT, session.read()).await.unwrap().unwrap().unwrap();
        echoed.extend_from_slice(&chunk);
    }
    assert_eq!(echoed, vec![0xde, 0xad, 0xbe, 0xef]);
    session.close().await.unwrap();
}
