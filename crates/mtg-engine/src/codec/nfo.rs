//! # NFO Memo Envelope
//!
//! Binary memo carried as the extra of collectible transactions.
//!
//! ```text
//! "NFO" ‖ version(0x00) ‖ hint
//!   hint = 1: mask(u64 BE) ‖ chain(16) ‖ len‖class ‖ len‖collection ‖ len‖token
//!   hint = 0: (nothing)
//! ‖ len‖extra
//! ```
//!
//! Every length prefix is one byte and at most 127. Decoding checks every
//! fixed constant and rejects truncated input and trailing bytes.

use uuid::{uuid, Uuid};

use crate::domain::{unique_id, Hash32, NfoError};

/// Envelope prefix.
pub const NFO_PREFIX: &[u8; 3] = b"NFO";

/// Envelope version.
pub const NFO_VERSION: u8 = 0x00;

/// Chain every minted token belongs to.
pub const NFO_DEFAULT_CHAIN: Uuid = uuid!("43d61dcd-e413-450d-80b8-101d5e903357");

/// Contract class of every minted token.
pub const NFO_DEFAULT_CLASS: [u8; 20] = [
    0x3c, 0x8c, 0x16, 0x1a, 0x18, 0xae, 0x2c, 0x8b, 0x14, 0xfd, 0xa1, 0x21, 0x6f, 0xff, 0x7d, 0xa8,
    0x8c, 0x41, 0x9b, 0x5d,
];

/// Largest length-prefixed field.
pub const NFO_MAX_FIELD_LEN: usize = 127;

const HINT_PLAIN: u8 = 0;
const HINT_MINT: u8 = 1;
const MINT_MASK: u64 = 1;

/// Decoded NFO envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfoMemo {
    /// Mint bitmask, zero when not minting.
    pub mask: u64,
    /// Token chain.
    pub chain: Uuid,
    /// Token class.
    pub class: Vec<u8>,
    /// Token collection.
    pub collection: Uuid,
    /// Canonical big-endian token number.
    pub token: Vec<u8>,
    /// Free-form payload.
    pub extra: Vec<u8>,
}

impl Default for NfoMemo {
    fn default() -> Self {
        Self {
            mask: 0,
            chain: Uuid::nil(),
            class: Vec::new(),
            collection: Uuid::nil(),
            token: Vec::new(),
            extra: Vec::new(),
        }
    }
}

impl NfoMemo {
    /// Mint envelope for `token` in `collection`, carrying the content hash.
    pub fn mint(collection: Uuid, token: &[u8], content_hash: &Hash32) -> Self {
        let mut nfo = Self {
            chain: NFO_DEFAULT_CHAIN,
            class: NFO_DEFAULT_CLASS.to_vec(),
            collection,
            token: token.to_vec(),
            extra: content_hash.as_bytes().to_vec(),
            ..Self::default()
        };
        nfo.mark(&[0]);
        nfo
    }

    /// Plain envelope carrying only `extra`.
    pub fn extra_only(extra: impl Into<Vec<u8>>) -> Self {
        Self {
            extra: extra.into(),
            ..Self::default()
        }
    }

    /// Toggle mask bits. Indexes of 64 and above are ignored.
    pub fn mark(&mut self, indexes: &[u32]) {
        for &i in indexes.iter().filter(|i| **i < 64) {
            self.mask ^= 1u64 << i;
        }
    }

    /// Set mask bits in ascending order.
    pub fn indexes(&self) -> Vec<u32> {
        (0..64).filter(|i| self.mask & (1u64 << i) != 0).collect()
    }

    /// True when the envelope mints a token.
    pub fn will_mint(&self) -> bool {
        self.mask != 0
    }

    /// Encode the envelope.
    pub fn encode(&self) -> Result<Vec<u8>, NfoError> {
        let mut w = NfoWriter::default();
        w.write(NFO_PREFIX);
        w.write_byte(NFO_VERSION);
        if self.will_mint() {
            if token_bytes_strip(&self.token) != self.token {
                return Err(NfoError::Token(hex::encode(&self.token)));
            }
            w.write_byte(HINT_MINT);
            w.write(&self.mask.to_be_bytes());
            w.write(self.chain.as_bytes());
            w.write_slice("class", &self.class)?;
            w.write_slice("collection", self.collection.as_bytes())?;
            w.write_slice("token", &self.token)?;
        } else {
            w.write_byte(HINT_PLAIN);
        }
        w.write_slice("extra", &self.extra)?;
        Ok(w.buf)
    }

    /// Decode and validate an envelope.
    pub fn decode(b: &[u8]) -> Result<Self, NfoError> {
        if b.len() < 4 {
            return Err(NfoError::TooShort(b.len()));
        }
        if &b[..3] != NFO_PREFIX {
            return Err(NfoError::Prefix(hex::encode(&b[..3])));
        }
        if b[3] != NFO_VERSION {
            return Err(NfoError::Version(b[3]));
        }

        let mut r = NfoReader { buf: &b[4..] };
        let mut nfo = Self::default();
        match r.read_byte()? {
            HINT_PLAIN => {}
            HINT_MINT => {
                nfo.mask = u64::from_be_bytes(r.read_array::<8>()?);
                if nfo.mask != MINT_MASK {
                    return Err(NfoError::Mask(nfo.mask));
                }
                nfo.chain = Uuid::from_bytes(r.read_array::<16>()?);
                if nfo.chain != NFO_DEFAULT_CHAIN {
                    return Err(NfoError::Chain(nfo.chain));
                }
                nfo.class = r.read_slice()?.to_vec();
                if nfo.class != NFO_DEFAULT_CLASS {
                    return Err(NfoError::Class(hex::encode(&nfo.class)));
                }
                let collection = r.read_slice()?;
                let collection: [u8; 16] = collection
                    .try_into()
                    .map_err(|_| NfoError::Collection(collection.len()))?;
                nfo.collection = Uuid::from_bytes(collection);
                nfo.token = r.read_slice()?.to_vec();
                if token_bytes_strip(&nfo.token) != nfo.token {
                    return Err(NfoError::Token(hex::encode(&nfo.token)));
                }
            }
            hint => return Err(NfoError::Hint(hint)),
        }
        nfo.extra = r.read_slice()?.to_vec();
        if !r.buf.is_empty() {
            return Err(NfoError::TrailingBytes(r.buf.len()));
        }
        Ok(nfo)
    }
}

/// Canonical big-endian form of an unsigned integer: no leading zeros,
/// zero is a single `0x00`.
pub fn token_bytes_strip(b: &[u8]) -> Vec<u8> {
    match b.iter().position(|x| *x != 0) {
        Some(i) => b[i..].to_vec(),
        None => vec![0],
    }
}

/// Trace id of a mint: `unique_id(h, h)` with `h = hex(sha3(nfo))`.
pub fn nfo_trace_id(nfo: &[u8]) -> Uuid {
    let h = Hash32::digest(nfo).to_hex();
    unique_id(&h, &h)
}

#[derive(Default)]
struct NfoWriter {
    buf: Vec<u8>,
}

impl NfoWriter {
    fn write(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn write_byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    fn write_slice(&mut self, field: &'static str, b: &[u8]) -> Result<(), NfoError> {
        if b.len() > NFO_MAX_FIELD_LEN {
            return Err(NfoError::FieldTooLong {
                field,
                len: b.len(),
            });
        }
        self.write_byte(b.len() as u8);
        self.write(b);
        Ok(())
    }
}

struct NfoReader<'a> {
    buf: &'a [u8],
}

impl<'a> NfoReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], NfoError> {
        if self.buf.len() < n {
            return Err(NfoError::Truncated {
                wanted: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_byte(&mut self) -> Result<u8, NfoError> {
        Ok(self.take(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], NfoError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_slice(&mut self) -> Result<&'a [u8], NfoError> {
        let len = self.read_byte()? as usize;
        self.take(len)
    }
}
