//! External-address probe via STUN (RFC 5389 binding request).
//!
//! One request, one response, informational only: the node logs its
//! XOR-mapped address at startup so operators can hand it to peers behind
//! other NATs.

use anyhow::{bail, Context, Result};
use rand::RngCore;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_RESPONSE: u16 = 0x0101;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Ask a STUN server for our reflexive address.
pub async fn external_address(server: &str) -> Result<SocketAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("binding probe socket")?;
    socket
        .connect(server)
        .await
        .with_context(|| format!("resolving STUN server {server}"))?;

    let mut transaction_id = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut transaction_id);

    let mut request = Vec::with_capacity(20);
    request.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    request.extend_from_slice(&0u16.to_be_bytes());
    request.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    request.extend_from_slice(&transaction_id);
    socket.send(&request).await.context("sending request")?;

    let mut buf = [0u8; 548];
    let n = timeout(PROBE_TIMEOUT, socket.recv(&mut buf))
        .await
        .context("STUN response timed out")?
        .context("receiving response")?;

    parse_binding_response(&buf[..n], &transaction_id)
}

fn parse_binding_response(packet: &[u8], transaction_id: &[u8; 12]) -> Result<SocketAddr> {
    if packet.len() < 20 {
        bail!("response shorter than a STUN header");
    }

    let msg_type = u16::from_be_bytes([packet[0], packet[1]]);
    if msg_type != BINDING_RESPONSE {
        bail!("unexpected STUN message type {msg_type:#06x}");
    }

    let cookie = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
    if cookie != MAGIC_COOKIE {
        bail!("bad magic cookie");
    }
    if &packet[8..20] != transaction_id {
        bail!("transaction id mismatch");
    }

    let msg_len = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    let body = &packet[20..packet.len().min(20 + msg_len)];

    let mut cursor = 0;
    while cursor + 4 <= body.len() {
        let attr_type = u16::from_be_bytes([body[cursor], body[cursor + 1]]);
        let attr_len = u16::from_be_bytes([body[cursor + 2], body[cursor + 3]]) as usize;
        let value_start = cursor + 4;
        if value_start + attr_len > body.len() {
            break;
        }
        let value = &body[value_start..value_start + attr_len];

        if attr_type == ATTR_XOR_MAPPED_ADDRESS {
            return decode_xor_mapped(value, transaction_id);
        }

        // Attributes are padded to 32-bit boundaries.
        cursor = value_start + attr_len.div_ceil(4) * 4;
    }

    bail!("no XOR-MAPPED-ADDRESS in response");
}

fn decode_xor_mapped(value: &[u8], transaction_id: &[u8; 12]) -> Result<SocketAddr> {
    if value.len() < 8 {
        bail!("truncated XOR-MAPPED-ADDRESS");
    }

    let family = value[1];
    let xport = u16::from_be_bytes([value[2], value[3]]);
    let port = xport ^ (MAGIC_COOKIE >> 16) as u16;

    match family {
        0x01 => {
            let magic = MAGIC_COOKIE.to_be_bytes();
            let mut octets = [0u8; 4];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = value[4 + i] ^ magic[i];
            }
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        0x02 => {
            if value.len() < 20 {
                bail!("truncated IPv6 XOR-MAPPED-ADDRESS");
            }
            let mut mask = [0u8; 16];
            mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            mask[4..].copy_from_slice(transaction_id);
            let mut octets = [0u8; 16];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = value[4 + i] ^ mask[i];
            }
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        other => bail!("unknown address family {other:#04x}"),
    }
}
