//! On-wire framing for the netstore control protocol.
//!
//! Every control message is one UDP datagram shaped as either a *simple*
//! packet (`tag`, `seq`, `data`) or a *complex* packet (`tag`, `seq`,
//! `param`, `data`). This module only knows how to turn one into the other;
//! it has no notion of sockets, servers or clients.

use std::fmt;

use thiserror::Error;

/// Fixed width of the NUL-padded ASCII command tag.
pub const CMD_SIZE: usize = 10;
/// Scratch receive-buffer size; also the UDP datagram ceiling we assume.
pub const BUFFER_SIZE: usize = 65_535;
/// Largest `data` payload a simple packet may carry (keeps a MY_LIST chunk
/// plus its header under `BUFFER_SIZE`).
pub const DATA_MAX: usize = 65_489;

const SEQ_SIZE: usize = 8;
const PARAM_SIZE: usize = 8;
const SIMPLE_HEADER_LEN: usize = CMD_SIZE + SEQ_SIZE;
const COMPLEX_HEADER_LEN: usize = CMD_SIZE + SEQ_SIZE + PARAM_SIZE;

/// The ten recognised command tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
	Hello,
	GoodDay,
	List,
	MyList,
	Get,
	ConnectMe,
	Del,
	Add,
	NoWay,
	CanAdd,
}

impl Tag {
	/// All tags, in no particular order.
	pub const ALL: [Tag; 10] = [
		Tag::Hello,
		Tag::GoodDay,
		Tag::List,
		Tag::MyList,
		Tag::Get,
		Tag::ConnectMe,
		Tag::Del,
		Tag::Add,
		Tag::NoWay,
		Tag::CanAdd,
	];

	pub const fn as_str(self) -> &'static str {
		match self {
			Tag::Hello => "HELLO",
			Tag::GoodDay => "GOOD_DAY",
			Tag::List => "LIST",
			Tag::MyList => "MY_LIST",
			Tag::Get => "GET",
			Tag::ConnectMe => "CONNECT_ME",
			Tag::Del => "DEL",
			Tag::Add => "ADD",
			Tag::NoWay => "NO_WAY",
			Tag::CanAdd => "CAN_ADD",
		}
	}

	/// Whether this tag carries the extra 8-byte `param` field.
	pub const fn is_complex(self) -> bool {
		matches!(self, Tag::GoodDay | Tag::ConnectMe | Tag::CanAdd | Tag::Add)
	}

	fn from_str(s: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|t| t.as_str() == s)
	}

	fn encode_into(self, buf: &mut [u8; CMD_SIZE]) {
		buf.fill(0);
		let bytes = self.as_str().as_bytes();
		buf[..bytes.len()].copy_from_slice(bytes);
	}
}

impl fmt::Display for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
pub enum WireError {
	#[error("packet too short ({len} bytes)")]
	MalformedPacket { len: usize },
	#[error("unrecognised command tag {tag:?}")]
	UnknownTag { tag: String },
	#[error("packet exceeds UDP datagram ceiling ({len} bytes)")]
	PacketTooLarge { len: usize },
}

/// A fully decoded control packet.
///
/// `param` is `None` for the six simple tags and `Some(_)` for the four
/// complex ones; the distinction is purely which constructor/encoding was
/// used, not anything stored per-instance beyond that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
	pub tag: Tag,
	pub seq: u64,
	pub param: Option<u64>,
	pub data: Vec<u8>,
}

impl Packet {
	pub fn simple(tag: Tag, seq: u64, data: impl Into<Vec<u8>>) -> Self {
		assert!(!tag.is_complex(), "{tag} is a complex tag, use Packet::complex");
		Packet { tag, seq, param: None, data: data.into() }
	}

	pub fn complex(tag: Tag, seq: u64, param: u64, data: impl Into<Vec<u8>>) -> Self {
		assert!(tag.is_complex(), "{tag} is a simple tag, use Packet::simple");
		Packet { tag, seq, param: Some(param), data: data.into() }
	}

	/// Encode into a fresh buffer sized exactly to the wire representation.
	pub fn encode(&self) -> Result<Vec<u8>, WireError> {
		let header_len = if self.param.is_some() { COMPLEX_HEADER_LEN } else { SIMPLE_HEADER_LEN };
		let len = header_len + self.data.len();

		if len > BUFFER_SIZE {
			return Err(WireError::PacketTooLarge { len });
		}

		let mut buf = Vec::with_capacity(len);

		let mut tag_bytes = [0u8; CMD_SIZE];
		self.tag.encode_into(&mut tag_bytes);
		buf.extend_from_slice(&tag_bytes);
		buf.extend_from_slice(&self.seq.to_be_bytes());

		if let Some(param) = self.param {
			buf.extend_from_slice(&param.to_be_bytes());
		}

		buf.extend_from_slice(&self.data);

		Ok(buf)
	}

	/// Decode a datagram per the strict framing rules in §4.1: short
	/// packets are rejected before the tag is even consulted, and an
	/// unrecognised-but-well-formed tag is reported as `UnknownTag` so the
	/// caller can log-and-drop without special-casing length checks again.
	pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
		if bytes.len() > BUFFER_SIZE {
			return Err(WireError::PacketTooLarge { len: bytes.len() });
		}

		if bytes.len() < CMD_SIZE {
			return Err(WireError::MalformedPacket { len: bytes.len() });
		}

		let tag_field = &bytes[..CMD_SIZE];
		let nul = tag_field.iter().position(|&b| b == 0).unwrap_or(CMD_SIZE);
		let tag_str = std::str::from_utf8(&tag_field[..nul]).map_err(|_| WireError::UnknownTag { tag: format!("{tag_field:?}") })?;

		if bytes.len() < SIMPLE_HEADER_LEN {
			return Err(WireError::MalformedPacket { len: bytes.len() });
		}

		let seq = u64::from_be_bytes(bytes[CMD_SIZE..SIMPLE_HEADER_LEN].try_into().unwrap());

		let Some(tag) = Tag::from_str(tag_str) else {
			return Err(WireError::UnknownTag { tag: tag_str.to_owned() });
		};

		if tag.is_complex() {
			if bytes.len() < COMPLEX_HEADER_LEN {
				return Err(WireError::MalformedPacket { len: bytes.len() });
			}

			let param = u64::from_be_bytes(bytes[SIMPLE_HEADER_LEN..COMPLEX_HEADER_LEN].try_into().unwrap());
			let data = bytes[COMPLEX_HEADER_LEN..].to_vec();

			Ok(Packet { tag, seq, param: Some(param), data })
		} else {
			let data = bytes[SIMPLE_HEADER_LEN..].to_vec();

			Ok(Packet { tag, seq, param: None, data })
		}
	}

	/// `data` interpreted as a filename / substring (trailing NULs are not
	/// significant per §4.1).
	pub fn data_str(&self) -> &str {
		let trimmed = match self.data.iter().position(|&b| b == 0) {
			Some(idx) => &self.data[..idx],
			None => &self.data[..],
		};

		std::str::from_utf8(trimmed).unwrap_or("")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_simple() {
		let p = Packet::simple(Tag::List, 1234, b"abc".to_vec());
		let bytes = p.encode().unwrap();
		let decoded = Packet::decode(&bytes).unwrap();

		assert_eq!(decoded.tag, Tag::List);
		assert_eq!(decoded.seq, 1234);
		assert_eq!(decoded.param, None);
		assert_eq!(decoded.data, b"abc");
	}

	#[test]
	fn round_trip_complex() {
		let p = Packet::complex(Tag::Add, 42, 900, b"a.txt".to_vec());
		let bytes = p.encode().unwrap();
		let decoded = Packet::decode(&bytes).unwrap();

		assert_eq!(decoded.tag, Tag::Add);
		assert_eq!(decoded.seq, 42);
		assert_eq!(decoded.param, Some(900));
		assert_eq!(decoded.data, b"a.txt");
	}

	#[test]
	fn round_trip_empty_data() {
		let p = Packet::simple(Tag::Hello, 1, Vec::new());
		let bytes = p.encode().unwrap();
		let decoded = Packet::decode(&bytes).unwrap();

		assert!(decoded.data.is_empty());
	}

	#[test]
	fn rejects_short_packets() {
		assert!(matches!(Packet::decode(&[]), Err(WireError::MalformedPacket { .. })));
		assert!(matches!(Packet::decode(b"HELLO"), Err(WireError::MalformedPacket { .. })));

		// Exactly CMD_SIZE bytes, known tag, but no room for the seq field.
		let mut buf = [0u8; CMD_SIZE];
		buf[..5].copy_from_slice(b"HELLO");
		assert!(matches!(Packet::decode(&buf), Err(WireError::MalformedPacket { .. })));
	}

	#[test]
	fn rejects_short_complex_packet() {
		// A well-formed simple header claiming to be GOOD_DAY, but too
		// short to hold the mandatory param field.
		let mut buf = vec![0u8; SIMPLE_HEADER_LEN];
		buf[..8].copy_from_slice(b"GOOD_DAY");
		assert!(matches!(Packet::decode(&buf), Err(WireError::MalformedPacket { .. })));
	}

	#[test]
	fn rejects_unknown_tag() {
		let mut buf = vec![0u8; SIMPLE_HEADER_LEN];
		buf[..7].copy_from_slice(b"UNKNOWN");
		assert!(matches!(Packet::decode(&buf), Err(WireError::UnknownTag { .. })));
	}

	#[test]
	fn trailing_nuls_not_significant_in_data() {
		let mut data = b"a.txt".to_vec();
		data.extend_from_slice(&[0, 0, 0]);

		let p = Packet::simple(Tag::Get, 7, data);
		assert_eq!(p.data_str(), "a.txt");
	}

	#[test]
	fn two_hellos_have_distinct_seqs() {
		let a = Packet::simple(Tag::Hello, 1, Vec::new());
		let b = Packet::simple(Tag::Hello, 2, Vec::new());

		assert_ne!(a.seq, b.seq);
		assert_eq!(Packet::decode(&a.encode().unwrap()).unwrap().seq, 1);
		assert_eq!(Packet::decode(&b.encode().unwrap()).unwrap().seq, 2);
	}

	#[test]
	fn data_at_max_size_round_trips() {
		let data = vec![b'x'; DATA_MAX];
		let p = Packet::simple(Tag::MyList, 9, data.clone());
		let decoded = Packet::decode(&p.encode().unwrap()).unwrap();
		assert_eq!(decoded.data, data);
	}
}
