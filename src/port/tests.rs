use super::*;
use crate::config::DeviceConfig;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::io::AsyncReadExt;

#[derive(Default)]
struct Recorder {
    data: Mutex<Vec<u8>>,
    errors: Mutex<Vec<String>>,
    state_changes: Mutex<usize>,
}

impl DataHandler for Recorder {
    fn data_received(&self, data: &[u8]) { self.data.lock().unwrap().extend_from_slice(data); }
}

impl PortListener for Recorder {
    fn port_state_changed(&self) { *self.state_changes.lock().unwrap() += 1; }
    fn port_error(&self, message: &str) { self.errors.lock().unwrap().push(message.to_string()); }
}

fn handlers(recorder: &Arc<Recorder>) -> PortHandlers {
    PortHandlers { data: Arc::clone(recorder) as Arc<dyn DataHandler>, listener: Arc::clone(recorder) as Arc<dyn PortListener> }
}

#[test]
fn test_sim_link_delivers_and_records() {
    let hub = SimPortHub::new();
    let recorder = Arc::new(Recorder::default());
    let port = hub.link("vario").open(handlers(&recorder)).unwrap();
    assert_eq!(port.state(), PortState::Ready);
    assert!(hub.link("vario").inject(b"$PING\r\n"));
    assert_eq!(recorder.data.lock().unwrap().as_slice(), b"$PING\r\n");

    port.full_write(b"$PONG\r\n").unwrap();
    assert_eq!(hub.link("vario").written_string(), "$PONG\r\n");
    assert_eq!(hub.link("vario").open_count(), 1);

    drop(port);
    assert!(!hub.link("vario").inject(b"lost"));
}

#[test]
fn test_stopped_rx_buffers_for_read() {
    let hub = SimPortHub::new();
    let recorder = Arc::new(Recorder::default());
    let link = hub.link("logger");
    let port = link.open(handlers(&recorder)).unwrap();
    assert!(port.stop_rx());
    assert!(!port.stop_rx());
    link.inject(b"ABC");
    assert!(recorder.data.lock().unwrap().is_empty());

    let mut buf = [0u8; 2];
    assert_eq!(port.read(&mut buf, Duration::from_millis(10)), Ok(2));
    assert_eq!(&buf, b"AB");
    assert_eq!(port.read(&mut buf, Duration::from_millis(10)), Ok(1));
    assert_eq!(port.read(&mut buf, Duration::from_millis(10)), Err(PortError::Timeout));

    assert!(port.start_rx());
    link.inject(b"D");
    assert_eq!(recorder.data.lock().unwrap().as_slice(), b"D");
}

#[test]
fn test_sim_link_failure_is_reported() {
    let hub = SimPortHub::new();
    let recorder = Arc::new(Recorder::default());
    let link = hub.link("flarm");
    link.set_fail_open(true);
    assert!(matches!(link.open(handlers(&recorder)), Err(PortError::Open { .. })));
    link.set_fail_open(false);

    let port = link.open(handlers(&recorder)).unwrap();
    link.fail();
    assert_eq!(port.state(), PortState::Failed);
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    assert_eq!(*recorder.state_changes.lock().unwrap(), 1);
    assert_eq!(port.write(b"x"), Err(PortError::Closed));
}

#[test]
fn test_sim_link_limbo() {
    let hub = SimPortHub::new();
    let recorder = Arc::new(Recorder::default());
    let link = hub.link("listener");
    link.set_limbo(true);
    let port = link.open(handlers(&recorder)).unwrap();
    assert_eq!(port.state(), PortState::Limbo);
    assert_eq!(port.write(b"x"), Err(PortError::NotConnected));
    link.set_limbo(false);
    assert_eq!(port.state(), PortState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_dump_port_expires() {
    let hub = SimPortHub::new();
    let recorder = Arc::new(Recorder::default());
    let inner: Arc<dyn Port> = Arc::new(hub.link("dump").open(handlers(&recorder)).unwrap());
    let dump = DumpPort::new(inner, "dump");
    assert!(!dump.is_enabled());
    dump.enable_temporarily(Duration::from_secs(60));
    assert!(dump.is_enabled());
    dump.full_write(b"hello").unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(!dump.is_enabled());
    dump.enable();
    assert!(dump.is_enabled());
    dump.disable();
    assert!(!dump.is_enabled());
    assert_eq!(hub.link("dump").written(), b"hello");
}

#[tokio::test]
async fn test_unsupported_and_missing_ports() {
    let hub = SimPortHub::new();
    let recorder = Arc::new(Recorder::default());
    let handle = tokio::runtime::Handle::current();
    let rfcomm = DeviceConfig { port_type: crate::config::PortType::Rfcomm, ..DeviceConfig::default() };
    assert!(matches!(
        open_port(&rfcomm, &handle, &hub, handlers(&recorder)),
        Err(PortError::Unsupported { .. })
    ));
    let serial = DeviceConfig::serial("/dev/does-not-exist", 9600, "generic");
    assert!(matches!(open_port(&serial, &handle, &hub, handlers(&recorder)), Err(PortError::Open { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tcp_client_roundtrip() {
    let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let recorder = Arc::new(Recorder::default());
    let port_handlers = handlers(&recorder);
    let handle = tokio::runtime::Handle::current();
    let connect = tokio::task::spawn_blocking(move || {
        TcpClientPort::connect("127.0.0.1", addr.port(), &handle, port_handlers)
    });
    let (mut peer, _) = server.accept().await.unwrap();
    let port = connect.await.unwrap().unwrap();
    assert_eq!(port.state(), PortState::Ready);

    peer.write_all(b"$GPGGA\r\n").await.unwrap();
    for _ in 0..100 {
        if !recorder.data.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(recorder.data.lock().unwrap().as_slice(), b"$GPGGA\r\n");

    port.full_write(b"OK").unwrap();
    let mut buf = [0u8; 2];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"OK");

    drop(peer);
    for _ in 0..100 {
        if port.state() == PortState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(port.state(), PortState::Failed);
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
}
