// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Streaming ACN (E1.31) output and input.

use std::{
    collections::{BTreeSet, HashMap},
    error::Error,
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Sender, TrySendError};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, span, trace, warn, Level};
use uuid::Uuid;

use super::{transport::DmxTransport, UNIVERSE_SIZE};
use crate::shutdown::ShutdownHandle;

pub const SACN_PORT: u16 = 5568;
pub const DEFAULT_PRIORITY: u8 = 100;
pub const MAX_PRIORITY: u8 = 200;
pub const MAX_UNIVERSE: u16 = 63999;

const PACKET_SIZE: usize = 638;
const ACN_PACKET_IDENTIFIER: [u8; 12] = [
    0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00,
];
const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;
const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;
const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
const OPTION_STREAM_TERMINATED: u8 = 0x40;
const SOURCE_NAME_LENGTH: usize = 64;
/// The source name field is null terminated, so at most this many bytes fit.
pub const MAX_SOURCE_NAME_LENGTH: usize = SOURCE_NAME_LENGTH - 1;

// Field offsets within a data packet.
const CID_OFFSET: usize = 22;
const FRAMING_VECTOR_OFFSET: usize = 40;
const SOURCE_NAME_OFFSET: usize = 44;
const PRIORITY_OFFSET: usize = 108;
const SEQUENCE_OFFSET: usize = 111;
const OPTIONS_OFFSET: usize = 112;
const UNIVERSE_OFFSET: usize = 113;
const DMP_VECTOR_OFFSET: usize = 117;
const PROPERTY_COUNT_OFFSET: usize = 123;
const START_CODE_OFFSET: usize = 125;
const DATA_OFFSET: usize = 126;

/// Gets the multicast group a universe is published on.
pub fn multicast_address(universe: u16) -> Ipv4Addr {
    Ipv4Addr::new(239, 255, (universe >> 8) as u8, (universe & 0xFF) as u8)
}

fn validate_universe(universe: u16) -> Result<(), Box<dyn Error>> {
    if universe == 0 || universe > MAX_UNIVERSE {
        return Err(format!(
            "Invalid sACN universe: {} (must be 1-{})",
            universe, MAX_UNIVERSE
        )
        .into());
    }
    Ok(())
}

/// Builds a complete E1.31 data packet carrying a full universe.
pub fn build_data_packet(
    cid: &[u8; 16],
    source_name: &str,
    priority: u8,
    sequence: u8,
    options: u8,
    universe: u16,
    levels: &[u8; UNIVERSE_SIZE],
) -> Vec<u8> {
    let mut packet = vec![0u8; PACKET_SIZE];

    // Root layer.
    packet[0..2].copy_from_slice(&0x0010u16.to_be_bytes());
    packet[4..16].copy_from_slice(&ACN_PACKET_IDENTIFIER);
    packet[16..18].copy_from_slice(&flags_and_length(PACKET_SIZE - 16));
    packet[18..22].copy_from_slice(&VECTOR_ROOT_E131_DATA.to_be_bytes());
    packet[CID_OFFSET..CID_OFFSET + 16].copy_from_slice(cid);

    // Framing layer.
    packet[38..40].copy_from_slice(&flags_and_length(PACKET_SIZE - 38));
    packet[FRAMING_VECTOR_OFFSET..FRAMING_VECTOR_OFFSET + 4]
        .copy_from_slice(&VECTOR_E131_DATA_PACKET.to_be_bytes());
    let name = source_name.as_bytes();
    let name_length = name.len().min(MAX_SOURCE_NAME_LENGTH);
    packet[SOURCE_NAME_OFFSET..SOURCE_NAME_OFFSET + name_length]
        .copy_from_slice(&name[..name_length]);
    packet[PRIORITY_OFFSET] = priority.min(MAX_PRIORITY);
    packet[SEQUENCE_OFFSET] = sequence;
    packet[OPTIONS_OFFSET] = options;
    packet[UNIVERSE_OFFSET..UNIVERSE_OFFSET + 2].copy_from_slice(&universe.to_be_bytes());

    // DMP layer.
    packet[115..117].copy_from_slice(&flags_and_length(PACKET_SIZE - 115));
    packet[DMP_VECTOR_OFFSET] = VECTOR_DMP_SET_PROPERTY;
    packet[118] = 0xa1;
    packet[121..123].copy_from_slice(&0x0001u16.to_be_bytes());
    packet[PROPERTY_COUNT_OFFSET..PROPERTY_COUNT_OFFSET + 2]
        .copy_from_slice(&(UNIVERSE_SIZE as u16 + 1).to_be_bytes());
    packet[START_CODE_OFFSET] = 0x00;
    packet[DATA_OFFSET..].copy_from_slice(levels);

    packet
}

fn flags_and_length(length: usize) -> [u8; 2] {
    (0x7000u16 | length as u16).to_be_bytes()
}

/// A frame of levels received from another sACN source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundFrame {
    pub universe: u16,
    pub cid: [u8; 16],
    pub source_name: String,
    pub priority: u8,
    pub sequence: u8,
    pub terminated: bool,
    pub levels: [u8; UNIVERSE_SIZE],
}

/// Parses an E1.31 data packet. Anything that isn't a null start code data packet
/// yields None.
pub fn parse_data_packet(packet: &[u8]) -> Option<InboundFrame> {
    if packet.len() < DATA_OFFSET || packet[4..16] != ACN_PACKET_IDENTIFIER {
        return None;
    }
    if read_u32(packet, 18)? != VECTOR_ROOT_E131_DATA
        || read_u32(packet, FRAMING_VECTOR_OFFSET)? != VECTOR_E131_DATA_PACKET
        || packet[DMP_VECTOR_OFFSET] != VECTOR_DMP_SET_PROPERTY
        || packet[START_CODE_OFFSET] != 0x00
    {
        return None;
    }

    // The property count includes the start code.
    let count = usize::from(read_u16(packet, PROPERTY_COUNT_OFFSET)?).saturating_sub(1);
    let available = packet.len() - DATA_OFFSET;
    let count = count.min(available).min(UNIVERSE_SIZE);
    let mut levels = [0u8; UNIVERSE_SIZE];
    levels[..count].copy_from_slice(&packet[DATA_OFFSET..DATA_OFFSET + count]);

    let mut cid = [0u8; 16];
    cid.copy_from_slice(&packet[CID_OFFSET..CID_OFFSET + 16]);

    let name = &packet[SOURCE_NAME_OFFSET..SOURCE_NAME_OFFSET + SOURCE_NAME_LENGTH];
    let name_end = name.iter().position(|b| *b == 0).unwrap_or(name.len());

    Some(InboundFrame {
        universe: read_u16(packet, UNIVERSE_OFFSET)?,
        cid,
        source_name: String::from_utf8_lossy(&name[..name_end]).into_owned(),
        priority: packet[PRIORITY_OFFSET],
        sequence: packet[SEQUENCE_OFFSET],
        terminated: packet[OPTIONS_OFFSET] & OPTION_STREAM_TERMINATED != 0,
        levels,
    })
}

fn read_u16(packet: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes(packet.get(offset..offset + 2)?.try_into().ok()?))
}

fn read_u32(packet: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(packet.get(offset..offset + 4)?.try_into().ok()?))
}

/// Sends universes as sACN, multicast by default or unicast to a fixed destination.
pub struct SacnSender {
    socket: UdpSocket,
    cid: [u8; 16],
    source_name: String,
    priority: u8,
    destination: Option<IpAddr>,
    sequences: HashMap<u16, u8>,
}

impl SacnSender {
    pub fn new(
        source_name: &str,
        priority: u8,
        destination: Option<IpAddr>,
    ) -> Result<SacnSender, Box<dyn Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_multicast_loop_v4(true)?;

        let cid = *Uuid::new_v4().as_bytes();
        info!(
            source_name,
            priority,
            cid = %Uuid::from_bytes(cid),
            "sACN sender created"
        );

        Ok(SacnSender {
            socket,
            cid,
            source_name: source_name.to_string(),
            priority: priority.min(MAX_PRIORITY),
            destination,
            sequences: HashMap::new(),
        })
    }

    /// The component identifier stamped on every packet.
    pub fn cid(&self) -> [u8; 16] {
        self.cid
    }

    fn target(&self, universe: u16) -> SocketAddr {
        match self.destination {
            Some(address) => SocketAddr::new(address, SACN_PORT),
            None => SocketAddr::new(IpAddr::V4(multicast_address(universe)), SACN_PORT),
        }
    }

    fn next_sequence(&mut self, universe: u16) -> u8 {
        let sequence = self.sequences.entry(universe).or_insert(0);
        let current = *sequence;
        *sequence = sequence.wrapping_add(1);
        current
    }

    fn send_packet(
        &mut self,
        universe: u16,
        options: u8,
        levels: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), Box<dyn Error>> {
        validate_universe(universe)?;
        let sequence = self.next_sequence(universe);
        let packet = build_data_packet(
            &self.cid,
            &self.source_name,
            self.priority,
            sequence,
            options,
            universe,
            levels,
        );
        self.socket.send_to(&packet, self.target(universe))?;
        trace!(universe, sequence, "Sent sACN packet");
        Ok(())
    }
}

impl DmxTransport for SacnSender {
    fn name(&self) -> &str {
        "sacn"
    }

    fn send_dmx(
        &mut self,
        universe: u16,
        levels: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), Box<dyn Error>> {
        self.send_packet(universe, 0, levels)
    }

    /// Tells receivers the stream is going away. E1.31 asks for three terminated
    /// packets per universe.
    fn close(&mut self) {
        let universes: Vec<u16> = self.sequences.keys().copied().collect();
        let dark = [0u8; UNIVERSE_SIZE];
        for universe in universes {
            for _ in 0..3 {
                if let Err(err) = self.send_packet(universe, OPTION_STREAM_TERMINATED, &dark) {
                    warn!(universe, err = %err, "Unable to terminate sACN stream");
                    break;
                }
            }
        }
    }
}

/// Listens for sACN on the console's universes and queues what arrives. The queue is
/// bounded; frames that don't fit are dropped.
pub struct SacnReceiver {
    shutdown: ShutdownHandle,
    join_handle: Option<JoinHandle<()>>,
}

/// Binds a UDP socket that other sACN listeners on this host can bind as well.
fn bind_shared(port: u16) -> Result<UdpSocket, Box<dyn Error>> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).into())?;
    Ok(socket.into())
}

impl SacnReceiver {
    pub fn start(
        universes: &[u16],
        ignore_cid: Option<[u8; 16]>,
        queue: Sender<InboundFrame>,
    ) -> Result<SacnReceiver, Box<dyn Error>> {
        let socket = bind_shared(SACN_PORT)?;
        for universe in universes {
            validate_universe(*universe)?;
            socket.join_multicast_v4(&multicast_address(*universe), &Ipv4Addr::UNSPECIFIED)?;
        }
        socket.set_read_timeout(Some(Duration::from_millis(100)))?;

        let shutdown = ShutdownHandle::new();
        let universes: BTreeSet<u16> = universes.iter().copied().collect();
        let join_handle = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                Self::receive_thread(socket, universes, ignore_cid, queue, shutdown)
            })
        };

        Ok(SacnReceiver {
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn stop(&mut self) {
        self.shutdown.shutdown();
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                error!("Error joining sACN receive thread");
            }
        }
    }

    fn receive_thread(
        socket: UdpSocket,
        universes: BTreeSet<u16>,
        ignore_cid: Option<[u8; 16]>,
        queue: Sender<InboundFrame>,
        shutdown: ShutdownHandle,
    ) {
        let span = span!(Level::INFO, "sacn receive");
        let _enter = span.enter();
        info!(?universes, "Listening for sACN");

        let mut buffer = [0u8; 1144];
        let mut dropped: u64 = 0;
        while !shutdown.is_shutdown() {
            let length = match socket.recv_from(&mut buffer) {
                Ok((length, _)) => length,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(err) => {
                    error!(err = %err, "Error receiving sACN");
                    continue;
                }
            };

            let frame = match parse_data_packet(&buffer[..length]) {
                Some(frame) => frame,
                None => continue,
            };
            if !universes.contains(&frame.universe) || Some(frame.cid) == ignore_cid {
                continue;
            }

            match queue.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    dropped += 1;
                    debug!(universe = frame.universe, dropped, "Inbound queue full");
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        info!("Stopped listening for sACN");
    }
}

impl Drop for SacnReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
