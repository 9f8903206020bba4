use super::{AtomicPortState, Port, PortError, PortHandlers, PortState, RxGate};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const READ_BUFFER: usize = 1024;

enum Outgoing {
    Data(Vec<u8>),
    Drain(std::sync::mpsc::Sender<()>),
}

/// State shared by the port object and its socket task.
struct TcpShared {
    state: AtomicPortState,
    gate: RxGate,
    handlers: PortHandlers,
    /// sender into the writer of the current connection
    outgoing: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    close: CancellationToken,
}

impl TcpShared {
    fn new(initial: PortState, handlers: PortHandlers) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicPortState::new(initial),
            gate: RxGate::new(),
            handlers,
            outgoing: Mutex::new(None),
            close: CancellationToken::new(),
        })
    }

    /// Updates the state unless the port was closed, which pins it to `Failed`.
    fn set_state(&self, state: PortState) {
        if !self.close.is_cancelled() && self.state.set(state) {
            self.handlers.listener.port_state_changed();
        }
    }

    async fn handle_connection_rx(&self, socket: &mut ReadHalf<'_>) -> Result<(), std::io::Error> {
        let mut buffer = [0u8; READ_BUFFER];
        loop {
            let n = socket.read(&mut buffer).await?;
            if n == 0 {
                return Err(ErrorKind::UnexpectedEof.into());
            }
            self.gate.receive(&buffer[..n], &self.handlers);
        }
    }

    async fn handle_connection_tx(
        socket: &mut WriteHalf<'_>,
        outgoing: &mut mpsc::UnboundedReceiver<Outgoing>,
    ) -> Result<(), std::io::Error> {
        while let Some(msg) = outgoing.recv().await {
            match msg {
                Outgoing::Data(data) => socket.write_all(&data).await?,
                Outgoing::Drain(done) => {
                    socket.flush().await?;
                    let _ = done.send(());
                }
            }
        }
        Ok(())
    }

    /// Serves one connection until it breaks or the port is closed.
    async fn serve(&self, mut socket: TcpStream) -> Result<(), std::io::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.outgoing.lock().unwrap() = Some(tx);
        let result = {
            let (mut rx_socket, mut tx_socket) = socket.split();
            tokio::select! {
                res = Self::handle_connection_tx(&mut tx_socket, &mut rx) => res,
                res = self.handle_connection_rx(&mut rx_socket) => res,
                () = self.close.cancelled() => Ok(()),
            }
        };
        self.outgoing.lock().unwrap().take();
        let _ = socket.shutdown().await;
        result
    }

    fn report(&self, result: Result<(), std::io::Error>) {
        match result {
            Err(e) if !self.close.is_cancelled() => {
                crate::warn!("TCP connection closed: {e}");
                self.handlers.listener.port_error(&e.to_string());
            }
            _ => {}
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        match self.state.get() {
            PortState::Ready => {}
            PortState::Limbo => return Err(PortError::NotConnected),
            PortState::Failed => return Err(PortError::Closed),
        }
        let outgoing = self.outgoing.lock().unwrap();
        let sender = outgoing.as_ref().ok_or(PortError::NotConnected)?;
        sender.send(Outgoing::Data(data.to_vec())).map_err(|_| PortError::Closed)?;
        Ok(data.len())
    }

    fn drain(&self) -> Result<(), PortError> {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        {
            let outgoing = self.outgoing.lock().unwrap();
            let Some(sender) = outgoing.as_ref() else { return Ok(()) };
            sender.send(Outgoing::Drain(done_tx)).map_err(|_| PortError::Closed)?;
        }
        done_rx.recv_timeout(DRAIN_TIMEOUT).map_err(|_| PortError::Timeout)
    }
}

/// Outgoing TCP connection, e.g. to a FLARM over WiFi.
pub struct TcpClientPort {
    shared: Arc<TcpShared>,
}

impl TcpClientPort {
    /// Connects synchronously, then serves the socket on `handle`.
    pub fn connect(host: &str, port: u16, handle: &Handle, handlers: PortHandlers) -> Result<Self, PortError> {
        let name = format!("{host}:{port}");
        let socket = handle
            .block_on(async { tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await })
            .map_err(|_| PortError::Timeout)?
            .map_err(|e| PortError::Open { name: name.clone(), reason: e.to_string() })?;
        let _ = socket.set_nodelay(true);

        let shared = TcpShared::new(PortState::Ready, handlers);
        let task_shared = Arc::clone(&shared);
        handle.spawn(async move {
            let result = task_shared.serve(socket).await;
            task_shared.report(result);
            task_shared.set_state(PortState::Failed);
        });
        crate::dev!("Connected to {name}");
        Ok(Self { shared })
    }
}

/// Listening TCP socket serving one client at a time. [`PortState::Limbo`] while
/// nobody is connected.
pub struct TcpListenerPort {
    shared: Arc<TcpShared>,
}

impl TcpListenerPort {
    pub fn bind(port: u16, handle: &Handle, handlers: PortHandlers) -> Result<Self, PortError> {
        let listener = handle
            .block_on(TcpListener::bind(("0.0.0.0", port)))
            .map_err(|e| PortError::Open { name: format!("TCP port {port}"), reason: e.to_string() })?;

        let shared = TcpShared::new(PortState::Limbo, handlers);
        let task_shared = Arc::clone(&shared);
        handle.spawn(async move {
            loop {
                let accept = tokio::select! {
                    accept = listener.accept() => accept,
                    () = task_shared.close.cancelled() => break,
                };
                match accept {
                    Ok((socket, peer)) => {
                        crate::dev!("TCP client {peer} connected on port {port}");
                        task_shared.set_state(PortState::Ready);
                        let result = task_shared.serve(socket).await;
                        task_shared.report(result);
                        task_shared.set_state(PortState::Limbo);
                    }
                    Err(e) => {
                        task_shared.handlers.listener.port_error(&e.to_string());
                        task_shared.set_state(PortState::Failed);
                        break;
                    }
                }
            }
        });
        Ok(Self { shared })
    }
}

macro_rules! impl_tcp_port {
    ($port:ty) => {
        impl Port for $port {
            fn state(&self) -> PortState { self.shared.state.get() }
            fn write(&self, data: &[u8]) -> Result<usize, PortError> { self.shared.write(data) }
            fn drain(&self) -> Result<(), PortError> { self.shared.drain() }
            fn stop_rx(&self) -> bool { self.shared.gate.stop() }
            fn start_rx(&self) -> bool { self.shared.gate.start() }
            fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
                self.shared.gate.read(buf, timeout)
            }
            fn close(&self) {
                self.shared.close.cancel();
                self.shared.state.set(PortState::Failed);
            }
        }

        impl Drop for $port {
            fn drop(&mut self) { self.shared.close.cancel(); }
        }
    };
}

impl_tcp_port!(TcpClientPort);
impl_tcp_port!(TcpListenerPort);
