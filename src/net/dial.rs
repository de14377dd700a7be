//! Initiator side: connect to a listener and run the three acts once.

use std::io;
use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::crypto::{Act, HandshakeMachine, IdentityKey, PublicKey, ACT_TWO_SIZE};
use crate::error::{GateError, Result};
use crate::net::connection::{ConnectionId, SecuredConnection};
use crate::net::handshake::{read_act, write_act};

/// Connect to `addr` and authenticate as `local`, expecting the listener to
/// hold `remote_static`.
///
/// `timeout` bounds the TCP connect and the act two read separately. There is
/// no retry: a failure is returned to the caller as is.
pub async fn dial<A: ToSocketAddrs>(
    local: IdentityKey,
    remote_static: PublicKey,
    addr: A,
    timeout: Duration,
) -> Result<SecuredConnection> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| GateError::Connect(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(GateError::Connect)?;
    let peer_addr = stream.peer_addr().map_err(GateError::Connect)?;

    let mut machine = HandshakeMachine::initiator(local, remote_static);

    let act_one = machine.gen_act_one()?;
    write_act(&mut stream, Act::One, &act_one).await?;

    let mut act_two = [0u8; ACT_TWO_SIZE];
    read_act(&mut stream, Act::Two, &mut act_two, timeout).await?;
    machine.recv_act_two(&act_two)?;

    let act_three = machine.gen_act_three()?;
    write_act(&mut stream, Act::Three, &act_three).await?;

    let id = ConnectionId::new();
    tracing::debug!(
        connection_id = %id,
        peer = %peer_addr,
        remote_static = %remote_static.short_hex(),
        "Dial complete"
    );

    Ok(SecuredConnection::new(id, stream, peer_addr, remote_static, machine))
}
