//! Consumer side of the mesh: contacts the producer's master listener to
//! learn the full producer endpoint list, partitions that list across the
//! consumer's own group, opens its share of connections, performs the
//! handshake on each, and receives the per-connection schema blob.
//!
//! Mirrors the shape of `mesh::producer::Producer::bind` for the
//! connecting side: collective broadcast replaces collective gather, and
//! a balanced partition of the producer list replaces a listener accept
//! loop.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};

use futures::stream::FuturesUnordered;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::warn;

use crate::comm::GroupComm;
use crate::error::{Result, StreamError};
use crate::mesh::balanced_partition;
use crate::mesh::handshake::{patch_endianness, patch_sender_rank, HandshakeRecord, HANDSHAKE_SIZE};
use crate::select::remap::scatter_window;
use crate::select::{ConnPartition, ProblemKind, Selection, SelectionDescriptor};
use crate::util::cursor::{ReadCursor, WriteCursor};
use crate::wire::frame::FrameMessage;
use crate::wire::schema::decode_schema;
use crate::wire::types::{propagate_array_size_dependency, Variable};
use crate::wire::{Endianness, FrameCodec};

/// One producer connection owned by this consumer rank. Carries its own
/// copy of the schema because each producer peer owns a distinct
/// partition and therefore distinct `l_size`/`l_offset` values for the
/// same named variable.
struct ConsumerConnection {
    #[allow(dead_code)]
    producer_rank: i32,
    framed: Framed<TcpStream, FrameCodec>,
    vars: BTreeMap<String, Variable>,
}

pub struct Consumer {
    #[allow(dead_code)]
    rank: usize,
    #[allow(dead_code)]
    size: usize,
    connections: Vec<ConsumerConnection>,
}

impl Consumer {
    /// Contacts `master_host:master_port` (rank 0 only), learns the full
    /// producer endpoint list, broadcasts it to the rest of the group,
    /// computes this rank's balanced share of producers, and performs the
    /// handshake plus schema receive on each owned connection.
    pub async fn connect<C: GroupComm>(
        master_host: &str,
        master_port: u16,
        comm: &C,
    ) -> Result<Self> {
        let rank = comm.rank();
        let size = comm.size();
        let my_endianness = Endianness::probe();

        let mut master_stream: Option<TcpStream> = None;
        let mut bootstrap = WriteCursor::new();

        if rank == 0 {
            let mut stream = TcpStream::connect((master_host, master_port)).await?;
            let mut endian_byte = [0u8; 1];
            stream.read_exact(&mut endian_byte).await?;
            let producer_endianness = Endianness::from_byte(endian_byte[0]);

            let mut count_buf = [0u8; 4];
            stream.read_exact(&mut count_buf).await?;
            let producer_count = u32::from_be_bytes(count_buf) as usize;

            let mut ip_buf = vec![0u8; 4 * producer_count];
            stream.read_exact(&mut ip_buf).await?;
            let mut port_buf = vec![0u8; 2 * producer_count];
            stream.read_exact(&mut port_buf).await?;

            bootstrap.write_u8(producer_endianness.as_byte());
            bootstrap.write_u32_be(producer_count as u32);
            bootstrap.write_bytes(&ip_buf);
            bootstrap.write_bytes(&port_buf);

            master_stream = Some(stream);
        }

        let mut buf = bootstrap.into_vec();
        comm.broadcast_bytes(0, &mut buf).await?;

        let mut r = ReadCursor::new(&buf);
        let producer_endianness = Endianness::from_byte(r.read_u8()?);
        let producer_count = r.read_u32_be()? as usize;
        let mut ip_list = Vec::with_capacity(producer_count);
        for _ in 0..producer_count {
            let b = r.read_bytes(4)?;
            ip_list.push(Ipv4Addr::new(b[0], b[1], b[2], b[3]));
        }
        let mut port_list = Vec::with_capacity(producer_count);
        for _ in 0..producer_count {
            let b = r.read_bytes(2)?;
            port_list.push(u16::from_be_bytes([b[0], b[1]]));
        }

        let (offset, count) = balanced_partition(producer_count, size, rank);

        // Rank 0 builds the 21-byte handshake record (its connection_id
        // encodes its own master connection's local endpoint) and
        // broadcasts it; every rank then patches in its own rank and
        // endianness before sending the record on each connection it
        // owns.
        let mut record_bytes = if rank == 0 {
            let local_addr = master_stream
                .as_ref()
                .map(|s| s.local_addr())
                .transpose()?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
            HandshakeRecord {
                producer_ranks_total: producer_count as i32,
                connection_id: encode_client_id(local_addr),
                sender_rank: 0,
                sender_ranks_total: size as i32,
                endianness: my_endianness,
            }
            .encode()
            .to_vec()
        } else {
            vec![0u8; HANDSHAKE_SIZE]
        };
        comm.broadcast_bytes(0, &mut record_bytes).await?;

        let mut record_arr = [0u8; HANDSHAKE_SIZE];
        record_arr.copy_from_slice(&record_bytes);
        patch_sender_rank(&mut record_arr, rank as i32);
        patch_endianness(&mut record_arr, my_endianness);

        let mut connections = Vec::with_capacity(count);
        for producer_idx in offset..offset + count {
            let stream = if rank == 0 && producer_idx == 0 && master_stream.is_some() {
                master_stream.take().unwrap()
            } else {
                TcpStream::connect((ip_list[producer_idx], port_list[producer_idx])).await?
            };
            connections.push(handshake_one(stream, producer_idx as i32, &record_arr).await?);
        }

        if producer_endianness != my_endianness {
            warn!(
                rank,
                "producer endianness differs from this consumer's; \
                 payloads pass through unconverted"
            );
        }

        Ok(Self {
            rank,
            size,
            connections,
        })
    }

    /// Drains one frame from every owned connection, dispatching named
    /// values into that connection's variable table and propagating
    /// `ArraySize` updates into dependent dimension caches, until every
    /// connection has delivered its end-of-frame sentinel. A consumer
    /// with zero owned connections (its share was empty because there
    /// are more consumer ranks than producers) returns immediately.
    pub async fn read(&mut self) -> Result<()> {
        let mut done = vec![false; self.connections.len()];
        loop {
            if done.iter().all(|&d| d) {
                break;
            }
            let ready = {
                let mut reads = FuturesUnordered::new();
                for (idx, conn) in self.connections.iter_mut().enumerate() {
                    if !done[idx] {
                        reads.push(async move { (idx, conn.framed.next().await) });
                    }
                }
                reads.next().await
            };
            let Some((idx, msg)) = ready else {
                break;
            };
            match msg {
                Some(Ok(FrameMessage::Sentinel)) => done[idx] = true,
                Some(Ok(FrameMessage::Value { name, payload })) => {
                    let conn = &mut self.connections[idx];
                    if let Some(var) = conn.vars.get_mut(&name) {
                        var.set_value_bytes(&payload);
                    } else {
                        warn!(name, "received value for a variable not in this connection's schema");
                    }
                    propagate_array_size_dependency(&mut conn.vars, &name);
                }
                Some(Err(e)) => return Err(e),
                None => return Err(StreamError::ConnectionClosed),
            }
        }
        Ok(())
    }

    /// Sends the release sentinel on every owned connection.
    pub async fn release_time_step(&mut self) -> Result<()> {
        for conn in self.connections.iter_mut() {
            conn.framed.send(FrameMessage::Sentinel).await?;
        }
        Ok(())
    }

    /// Copies `var_name`'s resolved global extents into `out_size`, or
    /// leaves it zeroed if the variable is a scalar.
    pub fn global_size_for(&self, var_name: &str, out_size: &mut [u32]) -> Result<()> {
        let var = self
            .connections
            .iter()
            .find_map(|c| c.vars.get(var_name))
            .ok_or_else(|| StreamError::UnknownVariable(var_name.to_string()))?;
        out_size.fill(0);
        for (k, slot) in out_size.iter_mut().enumerate() {
            if let Some(&g) = var.g_size.get(k) {
                *slot = g;
            }
        }
        Ok(())
    }

    /// Returns the raw bytes currently held for `var_name` on whichever
    /// owned connection carries it - the scalar counterpart to
    /// `create_global_array_selection`/`fill_selection`, which only cover
    /// array variables.
    pub fn variable_value(&self, var_name: &str) -> Result<&[u8]> {
        self.connections
            .iter()
            .find_map(|c| c.vars.get(var_name))
            .map(|v| v.value_buf.as_slice())
            .ok_or_else(|| StreamError::UnknownVariable(var_name.to_string()))
    }

    /// Builds a redistribution descriptor for `var_name`'s current
    /// per-connection partitions plus the caller's desired window.
    pub fn create_global_array_selection(
        &self,
        var_name: &str,
        size: &[u32],
        offset: &[u32],
    ) -> Result<Selection> {
        if size.len() != offset.len() {
            return Err(StreamError::VariableDimsMismatch(var_name.to_string()));
        }
        let kind = ProblemKind::from_dims(size.len())?;

        let mut element_type = None;
        let mut element_size = 0usize;
        let mut owned_chunks = Vec::with_capacity(self.connections.len());
        for conn in &self.connections {
            let var = conn
                .vars
                .get(var_name)
                .ok_or_else(|| StreamError::UnknownVariable(var_name.to_string()))?;
            if var.dims as usize != size.len() {
                return Err(StreamError::InvalidSelectionDims(var.dims));
            }
            element_type.get_or_insert(var.base_type);
            element_size = var.element_size();
            owned_chunks.push(ConnPartition {
                l_size: var.l_size.clone(),
                l_offset: var.l_offset.clone(),
            });
        }

        let element_type = element_type.ok_or_else(|| StreamError::UnknownVariable(var_name.to_string()))?;

        Ok(Selection {
            var_name: var_name.to_string(),
            kind,
            element_type,
            element_size,
            descriptor: SelectionDescriptor {
                owned_chunks,
                window_size: size.to_vec(),
                window_offset: offset.to_vec(),
            },
        })
    }

    /// Concatenates the current payload bytes of `selection`'s variable
    /// across owned connections, in connection order, then scatters them
    /// into `user_buffer` per the selection's window.
    pub fn fill_selection(&self, selection: &Selection, user_buffer: &mut [u8]) -> Result<()> {
        let mut concatenated = Vec::new();
        for conn in &self.connections {
            if let Some(var) = conn.vars.get(&selection.var_name) {
                concatenated.extend_from_slice(&var.value_buf);
            }
        }
        scatter_window(
            &selection.descriptor,
            selection.element_size,
            &concatenated,
            user_buffer,
        )
    }
}

/// Encodes a local `(ip, port)` socket address into the handshake
/// record's `connection_id` field: the producer-side id is this
/// consumer's self-reported "master_ip | master_port" pair.
fn encode_client_id(addr: SocketAddr) -> u64 {
    match addr {
        SocketAddr::V4(v4) => {
            let ip = u32::from(*v4.ip()) as u64;
            (ip << 16) | v4.port() as u64
        }
        SocketAddr::V6(_) => 0,
    }
}

async fn handshake_one(
    mut stream: TcpStream,
    producer_rank: i32,
    handshake: &[u8; HANDSHAKE_SIZE],
) -> Result<ConsumerConnection> {
    stream.write_all(handshake).await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut schema_buf = vec![0u8; len];
    stream.read_exact(&mut schema_buf).await?;

    let vars = decode_schema(&schema_buf)?
        .into_iter()
        .map(|v| (v.name.clone(), v))
        .collect();

    Ok(ConsumerConnection {
        producer_rank,
        framed: Framed::new(stream, FrameCodec::new()),
        vars,
    })
}
