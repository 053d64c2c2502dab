//! Wire codec for the pull protocol.
//!
//! Byte-exact encoding: fields in declared order, big-endian integers,
//! strings as a u32 length prefix followed by UTF-8 bytes, principal
//! arrays as a u32 count followed by 20-byte entries. Decoding is
//! fail-fast: unknown type tags, truncation, trailing bytes and invalid
//! UTF-8 all reject the message before any handler runs.

use crate::error::VerifyError;
use crate::types::{AgentId, CorrelationId, Principal};

pub const MSG_QUERY_IDENTITY: u8 = 1;
pub const MSG_IDENTITY_RESULT: u8 = 2;
pub const MSG_QUERY_REPUTATION: u8 = 3;
pub const MSG_REPUTATION_RESULT: u8 = 4;

/// Inbound query, decoded on the responder side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMessage {
    Identity {
        correlation: CorrelationId,
        agent: AgentId,
    },
    Reputation {
        correlation: CorrelationId,
        agent: AgentId,
        principals: Vec<Principal>,
        tag1: String,
        tag2: String,
    },
}

/// Response to a query, decoded on the result-store side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultMessage {
    Identity {
        correlation: CorrelationId,
        exists: bool,
        owner: Principal,
        uri: String,
        score: i128,
        feedback_count: u64,
    },
    Reputation {
        correlation: CorrelationId,
        count: u64,
        value: i128,
    },
}

impl QueryMessage {
    pub fn correlation(&self) -> CorrelationId {
        match self {
            QueryMessage::Identity { correlation, .. } => *correlation,
            QueryMessage::Reputation { correlation, .. } => *correlation,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            QueryMessage::Identity { correlation, agent } => {
                w.put_u8(MSG_QUERY_IDENTITY);
                w.put_bytes(correlation);
                w.put_bytes(agent);
            }
            QueryMessage::Reputation {
                correlation,
                agent,
                principals,
                tag1,
                tag2,
            } => {
                w.put_u8(MSG_QUERY_REPUTATION);
                w.put_bytes(correlation);
                w.put_bytes(agent);
                w.put_principals(principals);
                w.put_str(tag1);
                w.put_str(tag2);
            }
        }
        w.finish()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, VerifyError> {
        let mut r = Reader::new(payload);
        let message = match r.take_u8("type")? {
            MSG_QUERY_IDENTITY => QueryMessage::Identity {
                correlation: r.take_array32("correlationId")?,
                agent: r.take_array32("agentId")?,
            },
            MSG_QUERY_REPUTATION => QueryMessage::Reputation {
                correlation: r.take_array32("correlationId")?,
                agent: r.take_array32("agentId")?,
                principals: r.take_principals()?,
                tag1: r.take_str("tag1")?,
                tag2: r.take_str("tag2")?,
            },
            tag => {
                return Err(VerifyError::MalformedMessage(format!(
                    "unknown query type tag {tag}"
                )))
            }
        };
        r.expect_end()?;
        Ok(message)
    }
}

impl ResultMessage {
    pub fn correlation(&self) -> CorrelationId {
        match self {
            ResultMessage::Identity { correlation, .. } => *correlation,
            ResultMessage::Reputation { correlation, .. } => *correlation,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            ResultMessage::Identity {
                correlation,
                exists,
                owner,
                uri,
                score,
                feedback_count,
            } => {
                w.put_u8(MSG_IDENTITY_RESULT);
                w.put_bytes(correlation);
                w.put_u8(u8::from(*exists));
                w.put_bytes(owner);
                w.put_str(uri);
                w.put_i256(*score);
                w.put_u64(*feedback_count);
            }
            ResultMessage::Reputation {
                correlation,
                count,
                value,
            } => {
                w.put_u8(MSG_REPUTATION_RESULT);
                w.put_bytes(correlation);
                w.put_u64(*count);
                w.put_i128(*value);
            }
        }
        w.finish()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, VerifyError> {
        let mut r = Reader::new(payload);
        let message = match r.take_u8("type")? {
            MSG_IDENTITY_RESULT => ResultMessage::Identity {
                correlation: r.take_array32("correlationId")?,
                exists: r.take_bool()?,
                owner: r.take_principal("owner")?,
                uri: r.take_str("uri")?,
                score: r.take_i256()?,
                feedback_count: r.take_u64("feedbackCount")?,
            },
            MSG_REPUTATION_RESULT => ResultMessage::Reputation {
                correlation: r.take_array32("correlationId")?,
                count: r.take_u64("count")?,
                value: r.take_i128()?,
            },
            tag => {
                return Err(VerifyError::MalformedMessage(format!(
                    "unknown result type tag {tag}"
                )))
            }
        };
        r.expect_end()?;
        Ok(message)
    }
}

/// Append-only byte writer for the fixed field layouts.
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub(crate) fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub(crate) fn put_str(&mut self, v: &str) {
        self.buf.extend_from_slice(&(v.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(v.as_bytes());
    }

    pub(crate) fn put_principals(&mut self, v: &[Principal]) {
        self.buf.extend_from_slice(&(v.len() as u32).to_be_bytes());
        for principal in v {
            self.buf.extend_from_slice(principal);
        }
    }

    /// 16-byte big-endian two's complement.
    pub(crate) fn put_i128(&mut self, v: i128) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// 32-byte big-endian two's complement, sign-extended from i128.
    pub(crate) fn put_i256(&mut self, v: i128) {
        let fill = if v < 0 { 0xFF } else { 0x00 };
        self.buf.extend_from_slice(&[fill; 16]);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Fail-fast byte reader mirroring `Writer`.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], VerifyError> {
        if self.buf.len() - self.pos < len {
            return Err(VerifyError::MalformedMessage(format!(
                "truncated while reading {field}"
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn take_u8(&mut self, field: &str) -> Result<u8, VerifyError> {
        Ok(self.take(1, field)?[0])
    }

    pub(crate) fn take_bool(&mut self) -> Result<bool, VerifyError> {
        match self.take_u8("bool")? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(VerifyError::MalformedMessage(format!(
                "invalid bool byte {v}"
            ))),
        }
    }

    pub(crate) fn take_u64(&mut self, field: &str) -> Result<u64, VerifyError> {
        let bytes = self.take(8, field)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("fixed width")))
    }

    pub(crate) fn take_array32(&mut self, field: &str) -> Result<[u8; 32], VerifyError> {
        let bytes = self.take(32, field)?;
        Ok(bytes.try_into().expect("fixed width"))
    }

    pub(crate) fn take_principal(&mut self, field: &str) -> Result<Principal, VerifyError> {
        let bytes = self.take(20, field)?;
        Ok(bytes.try_into().expect("fixed width"))
    }

    pub(crate) fn take_str(&mut self, field: &str) -> Result<String, VerifyError> {
        let len = u32::from_be_bytes(self.take(4, field)?.try_into().expect("fixed width"));
        let bytes = self.take(len as usize, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| VerifyError::MalformedMessage(format!("{field} is not valid UTF-8")))
    }

    pub(crate) fn take_principals(&mut self) -> Result<Vec<Principal>, VerifyError> {
        let count = u32::from_be_bytes(
            self.take(4, "principals")?.try_into().expect("fixed width"),
        );
        let mut principals = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            principals.push(self.take_principal("principals")?);
        }
        Ok(principals)
    }

    pub(crate) fn take_i128(&mut self) -> Result<i128, VerifyError> {
        let bytes = self.take(16, "int128")?;
        Ok(i128::from_be_bytes(bytes.try_into().expect("fixed width")))
    }

    /// 32-byte two's complement; the value must fit in i128, i.e. the
    /// upper half must be a plain sign extension of the lower half.
    pub(crate) fn take_i256(&mut self) -> Result<i128, VerifyError> {
        let bytes = self.take(32, "int256")?;
        let low = i128::from_be_bytes(bytes[16..].try_into().expect("fixed width"));
        let fill = if low < 0 { 0xFF } else { 0x00 };
        if bytes[..16].iter().any(|b| *b != fill) {
            return Err(VerifyError::MalformedMessage(
                "int256 out of int128 range".to_string(),
            ));
        }
        Ok(low)
    }

    pub(crate) fn expect_end(&self) -> Result<(), VerifyError> {
        if self.pos != self.buf.len() {
            return Err(VerifyError::MalformedMessage(format!(
                "{} trailing bytes",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}
