//! Service type probe for Domain A.
//!
//! Domain A's discovery service lists service names but not their
//! types; the type lives in the server's connection header. The probe
//! performs the smallest possible handshake against the server: it
//! sends a header block with `probe=1` (metadata only, must not invoke
//! the service) and a wildcard `md5sum`, then reads back a single
//! header block and extracts the `type` field.
//!
//! Wire format: a header block is a 4-byte little-endian length
//! followed by that many bytes of fields; each field is itself a
//! 4-byte little-endian length followed by `key=value` bytes.
//!
//! Every probe is failure-isolated: a dead or misbehaving server costs
//! one bounded handshake (capped by a timeout) and one log line, never
//! the poll cycle.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::discovery::{DiscoveryError, DomainAIntrospect, ServiceType};

/// Upper bound on a header block (64 KiB). A length prefix beyond this
/// is treated as a malformed response rather than trusted.
const MAX_HEADER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("service lookup failed: {0}")]
    Lookup(#[source] DiscoveryError),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("header has no 'type' field")]
    MissingTypeField,

    #[error("invalid service type '{0}': missing package separator")]
    InvalidType(String),
}

/// Resolves a Domain A service name to its type via the probe handshake.
pub struct TypeProbe {
    /// Identity sent as `callerid` in the handshake header.
    caller_id: String,
    /// Per-probe deadline covering connect and both reads.
    timeout: Duration,
}

impl TypeProbe {
    pub fn new(caller_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            caller_id: caller_id.into(),
            timeout,
        }
    }

    /// Probe one service. Resolves the address through the domain's
    /// naming facility, then runs the handshake under the timeout.
    pub async fn probe(
        &self,
        introspect: &dyn DomainAIntrospect,
        service: &str,
    ) -> Result<ServiceType, ProbeError> {
        let (host, port) = introspect
            .lookup_service(service)
            .await
            .map_err(ProbeError::Lookup)?;

        match tokio::time::timeout(self.timeout, self.exchange(&host, port, service)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }

    async fn exchange(
        &self,
        host: &str,
        port: u16,
        service: &str,
    ) -> Result<ServiceType, ProbeError> {
        let mut stream = TcpStream::connect((host, port)).await?;

        let request = encode_header(&[
            ("probe", "1"),
            ("md5sum", "*"),
            ("service", service),
            ("callerid", &self.caller_id),
        ]);
        stream.write_all(&request).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_HEADER_SIZE {
            return Err(ProbeError::MalformedHeader(format!(
                "header length {len} exceeds {MAX_HEADER_SIZE} bytes"
            )));
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;

        let fields = decode_fields(&body)?;
        let raw_type = fields.get("type").ok_or(ProbeError::MissingTypeField)?;
        ServiceType::parse(raw_type).ok_or_else(|| ProbeError::InvalidType(raw_type.clone()))
    }
}

/// Encode a header block, including the outer length prefix.
pub fn encode_header(fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, value) in fields {
        let field = format!("{key}={value}");
        body.extend_from_slice(&(field.len() as u32).to_le_bytes());
        body.extend_from_slice(field.as_bytes());
    }

    let mut block = Vec::with_capacity(4 + body.len());
    block.extend_from_slice(&(body.len() as u32).to_le_bytes());
    block.extend_from_slice(&body);
    block
}

/// Decode the fields of a header block (without the outer prefix).
pub fn decode_fields(mut body: &[u8]) -> Result<BTreeMap<String, String>, ProbeError> {
    let mut fields = BTreeMap::new();
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(ProbeError::MalformedHeader(
                "truncated field length".to_string(),
            ));
        }
        let len = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
        body = &body[4..];
        if body.len() < len {
            return Err(ProbeError::MalformedHeader(format!(
                "field claims {len} bytes, {} available",
                body.len()
            )));
        }
        let field = std::str::from_utf8(&body[..len])
            .map_err(|_| ProbeError::MalformedHeader("field is not UTF-8".to_string()))?;
        body = &body[len..];

        let (key, value) = field.split_once('=').ok_or_else(|| {
            ProbeError::MalformedHeader(format!("field '{field}' has no '=' separator"))
        })?;
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(fields)
}
