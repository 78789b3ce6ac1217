use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use smol::{
    channel::{self, Receiver, Sender},
    future::{self, FutureExt},
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    Async,
};
use socket2::{Domain, Protocol, Socket, Type};

use super::{
    packet::{read_packet, send_packet, Incoming, Packet, ACK, EMPTY_REPLY},
    target::Target,
};

const LISTEN_BACKLOG: i32 = 1;

/// Requests from the owning thread to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Frame and send a packet to the connected client, if any.
    Send(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Accepted,
}

/// Handle to a running protocol worker.
///
/// Dropping it does not stop the worker: the thread keeps its sockets and
/// the target until the process exits.
pub struct RspServer {
    port: u16,
    control: Sender<Command>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl RspServer {
    /// Spawns the worker and returns once it is listening on `port`
    /// (0 picks a free one, see [`RspServer::port`]).
    pub fn start<T>(port: u16, target: T) -> Result<RspServer>
    where
        T: Target + Send + 'static,
    {
        let (ready_tx, ready_rx) = channel::bounded(1);
        let (control, control_rx) = channel::unbounded();

        let thread = thread::Builder::new()
            .name("rsp".into())
            .spawn(move || smol::block_on(worker(port, target, control_rx, ready_tx)))
            .context("spawn rsp worker")?;

        let port = smol::block_on(ready_rx.recv())
            .map_err(|_| anyhow!("rsp worker exited before listening"))?
            .with_context(|| format!("listen on port {}", port))?;

        Ok(RspServer {
            port,
            control,
            thread: Some(thread),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Checks that the worker is still alive and surfaces its error if not.
    pub fn execute(&mut self) -> Result<()> {
        let finished = match &self.thread {
            Some(thread) => thread.is_finished(),
            None => bail!("rsp worker already stopped"),
        };

        if !finished {
            return Ok(());
        }

        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(Err(e))) => Err(e),
            Some(Err(_)) => bail!("rsp worker panicked"),
            _ => bail!("rsp worker stopped"),
        }
    }

    /// Queues `payload` to be framed and sent to the current client.
    pub fn send(&self, payload: &str) -> Result<()> {
        self.control
            .try_send(Command::Send(payload.to_owned()))
            .map_err(|_| anyhow!("rsp worker is gone"))
    }
}

enum Wake {
    Control(Option<Command>),
    Accept(io::Result<(Async<TcpStream>, SocketAddr)>),
    Readable(io::Result<()>),
}

/// Listening socket on all interfaces with room for a single pending
/// connection.
fn listen(port: u16) -> io::Result<Async<TcpListener>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Async::new(TcpListener::from(socket))
}

async fn worker<T: Target>(
    port: u16,
    target: T,
    control: Receiver<Command>,
    ready: Sender<io::Result<u16>>,
) -> Result<()> {
    let bound = listen(port)
        .and_then(|listener| Ok((listener.get_ref().local_addr()?.port(), listener)));

    let (port, listener) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            let msg = e.to_string();
            let _ = ready.send(Err(e)).await;
            bail!("bind port {}: {}", port, msg);
        }
    };

    info!("Listening on port {}..", port);

    // The owner may already have given up waiting; serve anyway.
    let _ = ready.send(Ok(port)).await;

    let session = Session {
        port,
        listener,
        client: None,
        state: SessionState::Listening,
        target,
    };

    session.run(control).await
}

struct Session<T> {
    port: u16,
    listener: Async<TcpListener>,
    client: Option<Async<TcpStream>>,
    state: SessionState,
    target: T,
}

impl<T: Target> Session<T> {
    async fn run(mut self, control: Receiver<Command>) -> Result<()> {
        let mut control = Some(control);

        loop {
            let wake = {
                let ctl = async {
                    match &control {
                        Some(rx) => Wake::Control(rx.recv().await.ok()),
                        None => future::pending().await,
                    }
                };
                let accept = async { Wake::Accept(self.listener.accept().await) };

                match &self.client {
                    Some(client) => {
                        ctl.or(accept)
                            .or(async { Wake::Readable(client.readable().await) })
                            .await
                    }
                    None => ctl.or(accept).await,
                }
            };

            match wake {
                Wake::Control(Some(Command::Send(payload))) => self.send(&payload).await,
                Wake::Control(None) => {
                    debug!("control channel closed");
                    control = None;
                }
                Wake::Accept(Ok((stream, addr))) => {
                    if self.client.is_some() {
                        warn!("dropping previous client for {}", addr);
                    }
                    info!("Accepted {} on {}", addr, self.port);
                    self.client = Some(stream);
                    self.set_state(SessionState::Accepted);
                }
                Wake::Accept(Err(e)) => return Err(e).context("accept"),
                Wake::Readable(Ok(())) => self.handle().await,
                Wake::Readable(Err(e)) => self.hangup(&e),
            }
        }
    }

    async fn handle(&mut self) {
        let client = match &self.client {
            Some(client) => client,
            None => return,
        };

        let mut rd = client;
        let mut wr = client;

        match serve_packet(&mut rd, &mut wr, &mut self.target).await {
            Ok(Served::Done) => {}
            Ok(Served::Close) => {
                info!("Session killed");
                self.close();
            }
            Err(e) => self.hangup(&e),
        }
    }

    async fn send(&mut self, payload: &str) {
        let client = match &self.client {
            Some(client) => client,
            None => {
                debug!("no client, dropping {}", payload);
                return;
            }
        };

        let mut wr = client;
        if let Err(e) = send_packet(&mut wr, payload.as_bytes()).await {
            self.hangup(&e);
        }
    }

    fn hangup(&mut self, e: &io::Error) {
        info!("CS hangup: {}", e);
        self.close();
    }

    fn close(&mut self) {
        self.client = None;
        self.set_state(SessionState::Listening);
        info!("Listening on port {}..", self.port);
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("session {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Served {
    Done,
    /// The client asked to kill the target; drop the connection.
    Close,
}

async fn generic_reply<W: AsyncWrite + Unpin>(wr: &mut W) -> io::Result<Served> {
    wr.write_all(ACK).await?;
    wr.write_all(EMPTY_REPLY).await?;
    wr.flush().await?;

    Ok(Served::Done)
}

/// Reads one packet and answers it.
pub(crate) async fn serve_packet<R, W>(
    rd: &mut R,
    wr: &mut W,
    target: &mut dyn Target,
) -> io::Result<Served>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let packet = match read_packet(rd).await? {
        Incoming::Packet(packet) => packet,
        Incoming::Unknown(verb) => {
            debug!("Received unknown sync cmd '{}' ({:x})", verb as char, verb);
            return generic_reply(wr).await;
        }
        Incoming::Async(c) => {
            debug!("Received unknown async cmd '{}' ({:x})", c as char, c);
            return generic_reply(wr).await;
        }
        Incoming::Malformed => {
            debug!("Dropping malformed packet");
            return Ok(Served::Done);
        }
    };

    wr.write_all(ACK).await?;
    wr.flush().await?;

    let reply = match packet {
        Packet::Question => target.support_question().map(|ops| ops.question()),
        Packet::GetRegs => target.support_get_regs().map(|ops| ops.get_regs()),
        Packet::ReadMem { addr, len } => target
            .support_read_mem()
            .map(|ops| ops.read_mem(addr, len)),
        Packet::Step => target.support_resume().map(|ops| ops.stepi()),
        Packet::Continue => target.support_resume().map(|ops| ops.cont()),
        Packet::Kill => match target.support_kill() {
            Some(ops) => {
                ops.kill();
                wr.flush().await?;
                return Ok(Served::Close);
            }
            None => None,
        },
    };

    match reply {
        Some(payload) => {
            send_packet(wr, payload.as_bytes()).await?;
            Ok(Served::Done)
        }
        None => {
            warn!("Unsupported {:?} cb", packet);
            generic_reply(wr).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsp::target::{Question, ReadMem};
    use smol::io::Cursor;

    struct Stub {
        calls: usize,
    }

    impl Target for Stub {
        fn support_question(&mut self) -> Option<crate::rsp::target::QuestionOps<'_>> {
            Some(self)
        }

        fn support_read_mem(&mut self) -> Option<crate::rsp::target::ReadMemOps<'_>> {
            Some(self)
        }
    }

    impl Question for Stub {
        fn question(&mut self) -> String {
            self.calls += 1;
            "S05".into()
        }
    }

    impl ReadMem for Stub {
        fn read_mem(&mut self, addr: usize, len: usize) -> String {
            self.calls += 1;
            format!("{:02x}", addr + len)
        }
    }

    fn serve(input: &[u8], stub: &mut Stub) -> (io::Result<Served>, Vec<u8>) {
        let mut rd = Cursor::new(input.to_vec());
        let mut wr = Vec::new();
        let res = smol::block_on(serve_packet(&mut rd, &mut wr, stub));
        (res, wr)
    }

    #[test]
    fn question_is_acked_and_answered() {
        let mut stub = Stub { calls: 0 };
        let (res, out) = serve(b"+$?#3f", &mut stub);
        assert_eq!(res.unwrap(), Served::Done);
        assert_eq!(out, b"+$S05#b8");
        assert_eq!(stub.calls, 1);
    }

    #[test]
    fn read_mem_passes_arguments() {
        let mut stub = Stub { calls: 0 };
        let (_, out) = serve(b"$m10,2#f4", &mut stub);
        assert_eq!(out, b"+$12#63");
    }

    #[test]
    fn missing_slot_gets_empty_reply() {
        let mut stub = Stub { calls: 0 };
        let (res, out) = serve(b"$g#67", &mut stub);
        assert_eq!(res.unwrap(), Served::Done);
        assert_eq!(out, b"++$#00");
        assert_eq!(stub.calls, 0);
    }

    #[test]
    fn unknown_verb_gets_one_ack_and_empty_reply() {
        let mut stub = Stub { calls: 0 };
        let (_, out) = serve(b"$zab#12", &mut stub);
        assert_eq!(out, b"+$#00");
        assert_eq!(stub.calls, 0);
    }

    #[test]
    fn malformed_packet_is_silent() {
        let mut stub = Stub { calls: 0 };
        let (res, out) = serve(b"$m1x", &mut stub);
        assert_eq!(res.unwrap(), Served::Done);
        assert!(out.is_empty());
    }

    #[test]
    fn kill_without_slot_is_not_fatal() {
        let mut stub = Stub { calls: 0 };
        let (res, out) = serve(b"$k#6b", &mut stub);
        assert_eq!(res.unwrap(), Served::Done);
        assert_eq!(out, b"++$#00");
    }

    #[test]
    fn listener_takes_a_free_port_once() {
        let listener = listen(0).unwrap();
        let port = listener.get_ref().local_addr().unwrap().port();
        assert_ne!(port, 0);
        assert!(listen(port).is_err());
    }

    #[test]
    fn eof_is_an_error() {
        let mut stub = Stub { calls: 0 };
        let (res, _) = serve(b"$?", &mut stub);
        assert!(res.is_err());
    }
}
