//! Producer side of the mesh: binds a listener, gathers the group's
//! master list of `(ip, port)` pairs, then accepts and handshakes
//! consumer connections, continuing to accept new ones for the life of
//! the producer so a consumer can join the stream after it has already
//! started.
//!
//! The accept loop runs as a background task forwarding verified
//! connections over an `mpsc` channel - it keeps the listener and the
//! rest of `Producer`'s state from needing to be borrowed together
//! across an `await` point.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, SinkExt, StreamExt};
use rand::seq::SliceRandom;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::comm::GroupComm;
use crate::error::{Result, StreamError};
use crate::flow::StreamBehavior;
use crate::mesh::connection::Connection;
use crate::mesh::handshake::{HandshakeRecord, HANDSHAKE_SIZE};
use crate::wire::endian::check_ieee754_float;
use crate::wire::frame::FrameMessage;
use crate::wire::schema::encode_schema;
use crate::wire::types::{propagate_array_size_dependency, BaseType, Variable};
use crate::wire::Endianness;

const NEW_CONNECTION_BUFFER: usize = 64;

pub struct Producer {
    rank: usize,
    size: usize,
    port: u16,
    endianness: Endianness,
    ip_address_list: Vec<[u8; 4]>,
    port_list: Vec<u16>,
    vars: BTreeMap<String, Variable>,
    stream_behavior: StreamBehavior,
    connections: Vec<Connection>,
    new_conn_rx: Option<mpsc::Receiver<Connection>>,
}

impl Producer {
    /// Binds a listener in `port_min..=port_max` on `interface`'s IPv4
    /// address, then gathers every rank's `(ip, port)` into the group's
    /// master list (only populated on rank 0).
    pub async fn bind<C: GroupComm>(
        interface: &str,
        port_min: u16,
        port_max: u16,
        comm: &C,
    ) -> Result<(Self, TcpListener)> {
        check_ieee754_float();
        let endianness = Endianness::probe();

        let mut ports: Vec<u16> = (port_min..=port_max).collect();
        ports.shuffle(&mut rand::thread_rng());

        let mut bound = None;
        for port in &ports {
            if let Ok(listener) = TcpListener::bind(("0.0.0.0", *port)).await {
                bound = Some((listener, *port));
                break;
            }
        }
        let (listener, port) = bound.ok_or(StreamError::PortRangeExhausted {
            min: port_min,
            max: port_max,
        })?;

        let ip = local_ipv4_for_interface(interface)?;

        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&ip.octets());
        payload.extend_from_slice(&port.to_be_bytes());
        let gathered = comm.gather_bytes(0, &payload).await?;

        let (ip_address_list, port_list) = match gathered {
            Some(all) => {
                let mut ips = Vec::with_capacity(all.len());
                let mut ports = Vec::with_capacity(all.len());
                for entry in all {
                    ips.push([entry[0], entry[1], entry[2], entry[3]]);
                    ports.push(u16::from_be_bytes([entry[4], entry[5]]));
                }
                (ips, ports)
            }
            None => (Vec::new(), Vec::new()),
        };

        Ok((
            Self {
                rank: comm.rank(),
                size: comm.size(),
                port,
                endianness,
                ip_address_list,
                port_list,
                vars: BTreeMap::new(),
                stream_behavior: StreamBehavior::WaitForAll,
                connections: Vec::new(),
                new_conn_rx: None,
            },
            listener,
        ))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The producer group's master endpoint - `None` on every rank but 0.
    pub fn master_ip_address(&self) -> Option<Ipv4Addr> {
        (self.rank == 0)
            .then(|| self.ip_address_list.first())
            .flatten()
            .map(|o| Ipv4Addr::new(o[0], o[1], o[2], o[3]))
    }

    pub fn master_port(&self) -> Option<u16> {
        (self.rank == 0).then(|| self.port_list.first().copied()).flatten()
    }

    pub fn define_var(
        &mut self,
        name: impl Into<String>,
        base_type: BaseType,
        global_size: &[&str],
        local_size: &[&str],
        local_offset: &[&str],
    ) -> Result<()> {
        let name = name.into();
        if global_size.is_empty() && local_size.is_empty() && local_offset.is_empty() {
            self.vars
                .insert(name.clone(), Variable::new_scalar(name, base_type));
            return Ok(());
        }
        let gs = global_size.iter().map(|s| s.to_string()).collect();
        let ls = local_size.iter().map(|s| s.to_string()).collect();
        let lo = local_offset.iter().map(|s| s.to_string()).collect();
        let var = Variable::new_array(name.clone(), base_type, gs, ls, lo)?;
        self.vars.insert(name, var);
        Ok(())
    }

    pub fn set_value(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.vars.contains_key(name) {
            return Err(StreamError::UnknownVariable(name.to_string()));
        }
        if self.vars[name].length == 0 {
            warn!(name, "set_value on an array whose dimensions are not yet resolved; value dropped");
            return Ok(());
        }
        self.vars.get_mut(name).unwrap().set_value_bytes(bytes);
        propagate_array_size_dependency(&mut self.vars, name);
        Ok(())
    }

    /// Generates the schema blob, spawns the background accept loop,
    /// and blocks until `initial_wait_count` connections have completed
    /// their handshake.
    pub async fn var_definitions_complete(
        &mut self,
        behavior: StreamBehavior,
        initial_wait_count: usize,
        listener: TcpListener,
    ) -> Result<()> {
        self.stream_behavior = behavior;
        let schema_blob = Arc::new(encode_schema(
            &self.vars.values().cloned().collect::<Vec<_>>(),
        ));

        let (tx, rx) = mpsc::channel(NEW_CONNECTION_BUFFER);
        self.new_conn_rx = Some(rx);

        spawn_accept_loop(
            listener,
            tx,
            self.rank,
            self.size,
            self.endianness,
            self.ip_address_list.clone(),
            self.port_list.clone(),
            schema_blob,
        );

        while self.connections.len() < initial_wait_count {
            let rx = self.new_conn_rx.as_mut().expect("accept loop running");
            let conn = rx.recv().await.ok_or(StreamError::ChannelClosed)?;
            debug!(rank = self.rank, remote_rank = conn.remote_rank, "initial client verified");
            self.connections.push(conn);
        }
        Ok(())
    }

    /// Sends every updated (or, for a newly joined connection, every)
    /// variable to its connections in two passes - scalars first, then
    /// arrays - followed by the end-of-frame sentinel on every streaming
    /// connection.
    pub async fn write(&mut self) -> Result<()> {
        let any_new = self.connections.iter().any(|c| c.is_new);

        for pass_is_array in [false, true] {
            for (name, var) in self.vars.iter_mut() {
                if var.is_array() != pass_is_array {
                    continue;
                }
                if !(var.updated || any_new) {
                    continue;
                }
                let msg = FrameMessage::Value {
                    name: name.clone(),
                    payload: var.value_buf.clone(),
                };
                for conn in self.connections.iter_mut() {
                    if conn.is_new || var.updated {
                        conn.framed.send(msg.clone()).await?;
                    }
                }
                var.updated = false;
            }
        }

        for conn in self.connections.iter_mut() {
            conn.framed.send(FrameMessage::Sentinel).await?;
            conn.is_new = false;
        }
        Ok(())
    }

    /// `WaitForAll`: blocks until every streaming connection has sent
    /// its release byte, accepting newly joined connections (which start
    /// "ready" since they have nothing to release for a frame they
    /// never received) concurrently. `DropFrames`: drains whatever has
    /// already arrived and returns immediately.
    pub async fn advance_time_step(&mut self) -> Result<()> {
        match self.stream_behavior {
            StreamBehavior::DropFrames => {
                for conn in self.connections.iter_mut() {
                    while conn.framed.next().now_or_never().flatten().is_some() {}
                }
                if let Some(rx) = self.new_conn_rx.as_mut() {
                    while let Ok(conn) = rx.try_recv() {
                        self.connections.push(conn);
                    }
                }
                Ok(())
            }
            StreamBehavior::WaitForAll => {
                let mut ready: Vec<bool> = vec![false; self.connections.len()];
                loop {
                    // Opportunistically pick up any connection that finished
                    // its handshake while nobody was waiting on it yet, so a
                    // producer started with zero connections doesn't exit
                    // this loop before ever checking for one.
                    if let Some(rx) = self.new_conn_rx.as_mut() {
                        while let Ok(conn) = rx.try_recv() {
                            self.connections.push(conn);
                            ready.push(true);
                        }
                    }
                    if ready.iter().all(|&r| r) {
                        break;
                    }
                    let Self {
                        connections,
                        new_conn_rx,
                        ..
                    } = self;
                    let mut reads = FuturesUnordered::new();
                    for (idx, conn) in connections.iter_mut().enumerate() {
                        if !ready[idx] {
                            reads.push(async move { (idx, conn.framed.next().await) });
                        }
                    }
                    let rx = new_conn_rx.as_mut().expect("accept loop running");
                    tokio::select! {
                        maybe_conn = rx.recv() => {
                            drop(reads);
                            let conn = maybe_conn.ok_or(StreamError::ChannelClosed)?;
                            connections.push(conn);
                            ready.push(true);
                        }
                        Some((idx, msg)) = reads.next() => {
                            match msg {
                                Some(Ok(FrameMessage::Sentinel)) => ready[idx] = true,
                                Some(Ok(_)) => warn!("unexpected message while awaiting release"),
                                Some(Err(e)) => return Err(e),
                                None => return Err(StreamError::ConnectionClosed),
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<Connection>,
    rank: usize,
    size: usize,
    endianness: Endianness,
    ip_address_list: Vec<[u8; 4]>,
    port_list: Vec<u16>,
    schema_blob: Arc<Vec<u8>>,
) {
    tokio::spawn(async move {
        loop {
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };

            match handshake_new_connection(
                stream,
                rank,
                size,
                endianness,
                &ip_address_list,
                &port_list,
                &schema_blob,
            )
            .await
            {
                Ok(Some(conn)) => {
                    if tx.send(conn).await.is_err() {
                        return;
                    }
                }
                Ok(None) => continue,
                Err(e) => warn!("connection handshake failed: {e}"),
            }
        }
    });
}

async fn handshake_new_connection(
    mut stream: TcpStream,
    rank: usize,
    size: usize,
    endianness: Endianness,
    ip_address_list: &[[u8; 4]],
    port_list: &[u16],
    schema_blob: &[u8],
) -> Result<Option<Connection>> {
    use tokio::io::AsyncReadExt;

    if rank == 0 {
        // Master-list push: endianness byte, then the rank count (so the
        // consumer can size the two lists that follow without relying on
        // any transport-level message framing), then the ip list and the
        // port list back to back.
        let mut buf = Vec::with_capacity(5 + 4 * ip_address_list.len() + 2 * port_list.len());
        buf.push(endianness.as_byte());
        buf.extend_from_slice(&(ip_address_list.len() as u32).to_be_bytes());
        for ip in ip_address_list {
            buf.extend_from_slice(ip);
        }
        for port in port_list {
            buf.extend_from_slice(&port.to_be_bytes());
        }
        stream.write_all(&buf).await?;
    }

    let mut hs_buf = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut hs_buf).await?;
    let handshake = match HandshakeRecord::decode(&hs_buf) {
        Ok(h) => h,
        Err(e) => {
            warn!("rejecting connection with malformed handshake: {e}");
            return Ok(None);
        }
    };
    if handshake.producer_ranks_total as usize != size {
        return Err(StreamError::HandshakeRanksMismatch {
            expected: size as i32,
            got: handshake.producer_ranks_total,
        });
    }

    stream
        .write_all(&(schema_blob.len() as u32).to_be_bytes())
        .await?;
    stream.write_all(schema_blob).await?;

    let same_endianness = handshake.endianness == endianness;
    Ok(Some(Connection::new(
        handshake.connection_id,
        handshake.sender_rank,
        handshake.sender_ranks_total,
        true,
        same_endianness,
        stream,
    )))
}

fn local_ipv4_for_interface(interface: &str) -> Result<Ipv4Addr> {
    let interfaces =
        get_if_addrs::get_if_addrs().map_err(|e| StreamError::InterfaceNotFound(format!("{interface}: {e}")))?;
    interfaces
        .into_iter()
        .find(|i| i.name == interface)
        .and_then(|i| match i.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .ok_or_else(|| StreamError::InterfaceNotFound(interface.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagates_array_size_into_dependent_dimensions() {
        let mut vars = BTreeMap::new();
        vars.insert(
            "global_width".to_string(),
            Variable::new_scalar("global_width", BaseType::ArraySize),
        );
        vars.insert(
            "pixels".to_string(),
            Variable::new_array(
                "pixels",
                BaseType::U8,
                vec!["global_width".into()],
                vec!["global_width".into()],
                vec!["global_width".into()],
            )
            .unwrap(),
        );

        vars.get_mut("global_width")
            .unwrap()
            .set_value_bytes(&16u32.to_ne_bytes());
        propagate_array_size_dependency(&mut vars, "global_width");

        let pixels = &vars["pixels"];
        assert_eq!(pixels.g_size, vec![16]);
        assert_eq!(pixels.l_size, vec![16]);
        assert_eq!(pixels.l_offset, vec![16]);
        assert_eq!(pixels.length, 16);
    }
}
