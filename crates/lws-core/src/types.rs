//! Persisted domain types: accounts, outputs, spends, key images, blocks and
//! pending requests.
//!
//! Every type here has a fixed-width [`Record`] encoding. Layouts are part of
//! the store format and must not change without a migration.
use std::fmt;

use serde::{Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CommonError, Expect};
use crate::record::{Record, RecordReader};
use crate::record_field;

/// Stable account identifier, assigned at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct AccountId(pub u32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Record for AccountId {
    const SIZE: usize = 4;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.0.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self(u32::read_from(bytes))
    }
}

/// Block height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Record for BlockId {
    const SIZE: usize = 8;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.0.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self(u64::read_from(bytes))
    }
}

/// Chain position of an output: block height in the high 32 bits, index of
/// the output within the block in the low 32 bits.
///
/// Numeric order equals chain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct OutputId(pub u64);

impl OutputId {
    pub const fn new(height: u64, index: u32) -> Self {
        Self((height << 32) | index as u64)
    }

    pub const fn height(&self) -> u64 {
        self.0 >> 32
    }

    pub const fn index(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.height(), self.index())
    }
}

impl Record for OutputId {
    const SIZE: usize = 8;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.0.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self(u64::read_from(bytes))
    }
}

fn parse_hex32(s: &str) -> Expect<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|_| CommonError::InvalidArgument)?;
    bytes.try_into().map_err(|_| CommonError::InvalidArgument.into())
}

macro_rules! bytes32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn from_hex(s: &str) -> Expect<Self> {
                parse_hex32(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl Record for $name {
            const SIZE: usize = 32;

            fn write_to(&self, out: &mut Vec<u8>) {
                self.0.write_to(out);
            }

            fn read_from(bytes: &[u8]) -> Self {
                Self(<[u8; 32]>::read_from(bytes))
            }
        }
    };
}

bytes32!(
    /// A 32-byte hash (transaction hash, prefix hash, block hash) or key image.
    Hash256
);
bytes32!(
    /// A compressed Ed25519 point.
    PublicKey
);

/// A view secret key. Wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Default, Zeroize, ZeroizeOnDrop)]
pub struct ViewKey([u8; 32]);

impl ViewKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Expect<Self> {
        let mut bytes = parse_hex32(s)?;
        let key = Self(bytes);
        bytes.zeroize();
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewKey(<redacted>)")
    }
}

impl Record for ViewKey {
    const SIZE: usize = 32;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.0.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self(<[u8; 32]>::read_from(bytes))
    }
}

/// Public identity of a wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct AccountAddress {
    pub spend_public: PublicKey,
    pub view_public: PublicKey,
}

impl AccountAddress {
    /// Parse 128 hex characters: spend public key followed by view public key.
    pub fn from_hex(s: &str) -> Expect<Self> {
        if s.len() != 128 || !s.is_char_boundary(64) {
            return Err(CommonError::InvalidArgument.into());
        }
        let (spend, view) = s.split_at(64);
        Ok(Self {
            spend_public: PublicKey::from_hex(spend)?,
            view_public: PublicKey::from_hex(view)?,
        })
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.spend_public, self.view_public)
    }
}

impl Record for AccountAddress {
    const SIZE: usize = 64;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.spend_public.write_to(out);
        self.view_public.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self { spend_public: r.read(), view_public: r.read() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AccountStatus {
    Active = 0,
    Inactive = 1,
    /// Logically deleted; invisible to every non-administrative read.
    Hidden = 2,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 3] = [Self::Active, Self::Inactive, Self::Hidden];

    /// Unknown bytes decode as `Hidden` so a corrupt status never exposes an account.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Active,
            1 => Self::Inactive,
            _ => Self::Hidden,
        }
    }
}

impl Record for AccountStatus {
    const SIZE: usize = 1;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self::from_byte(bytes[0])
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub address: AccountAddress,
    pub view_key: ViewKey,
    pub scan_height: BlockId,
    pub start_height: BlockId,
    /// Unix seconds of the last client access.
    pub access_time: u64,
    pub creation_time: u64,
}

impl Record for Account {
    const SIZE: usize = 132;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.id.write_to(out);
        self.address.write_to(out);
        self.view_key.write_to(out);
        self.scan_height.write_to(out);
        self.start_height.write_to(out);
        self.access_time.write_to(out);
        self.creation_time.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self {
            id: r.read(),
            address: r.read(),
            view_key: r.read(),
            scan_height: r.read(),
            start_height: r.read(),
            access_time: r.read(),
            creation_time: r.read(),
        }
    }
}

/// Value of the address index: where to find the account row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountLookup {
    pub id: AccountId,
    pub status: AccountStatus,
}

impl Record for AccountLookup {
    const SIZE: usize = 5;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.id.write_to(out);
        self.status.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self { id: r.read(), status: r.read() }
    }
}

/// Output flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Extra(pub u8);

impl Extra {
    pub const NONE: Self = Self(0);
    pub const COINBASE: Self = Self(1);
    pub const RINGCT: Self = Self(2);

    pub fn contains(self, other: Extra) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_coinbase(self) -> bool {
        self.contains(Self::COINBASE)
    }

    pub fn is_ringct(self) -> bool {
        self.contains(Self::RINGCT)
    }
}

impl std::ops::BitOr for Extra {
    type Output = Extra;

    fn bitor(self, rhs: Extra) -> Extra {
        Extra(self.0 | rhs.0)
    }
}

impl Serialize for Extra {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl Record for Extra {
    const SIZE: usize = 1;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.0);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self(bytes[0])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaymentId {
    Short([u8; 8]),
    Long([u8; 32]),
}

impl PaymentId {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Short(b) => b,
            Self::Long(b) => b,
        }
    }
}

impl Serialize for PaymentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.as_bytes()))
    }
}

/// Encoded as a length byte (0, 8 or 32) followed by a 32-byte zero-padded slot.
impl Record for Option<PaymentId> {
    const SIZE: usize = 33;

    fn write_to(&self, out: &mut Vec<u8>) {
        let mut slot = [0u8; 32];
        let len = match self {
            None => 0u8,
            Some(id) => {
                let bytes = id.as_bytes();
                slot[..bytes.len()].copy_from_slice(bytes);
                bytes.len() as u8
            }
        };
        out.push(len);
        out.extend_from_slice(&slot);
    }

    fn read_from(bytes: &[u8]) -> Self {
        match bytes[0] {
            8 => Some(PaymentId::Short(<[u8; 8]>::read_from(&bytes[1..]))),
            32 => Some(PaymentId::Long(<[u8; 32]>::read_from(&bytes[1..]))),
            _ => None,
        }
    }
}

/// The part of an output needed to match spends against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SpendMeta {
    pub id: OutputId,
    pub amount: u64,
    pub mixin_count: u32,
    /// Index of the output within its transaction.
    pub index: u32,
    pub tx_public: PublicKey,
}

impl Record for SpendMeta {
    const SIZE: usize = 56;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.id.write_to(out);
        self.amount.write_to(out);
        self.mixin_count.write_to(out);
        self.index.write_to(out);
        self.tx_public.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self {
            id: r.read(),
            amount: r.read(),
            mixin_count: r.read(),
            index: r.read(),
            tx_public: r.read(),
        }
    }
}

/// Locates a transaction on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TransactionLink {
    pub height: BlockId,
    pub tx_hash: Hash256,
}

impl Record for TransactionLink {
    const SIZE: usize = 40;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.height.write_to(out);
        self.tx_hash.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self { height: r.read(), tx_hash: r.read() }
    }
}

/// An output received by an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Output {
    pub spend_meta: SpendMeta,
    pub link: TransactionLink,
    pub account: AccountId,
    pub timestamp: u64,
    pub unlock_time: u64,
    pub tx_prefix_hash: Hash256,
    /// Plain RingCT mask; meaningful only when `extra` has the RingCT flag.
    #[serde(skip)]
    pub ringct_mask: [u8; 32],
    pub extra: Extra,
    pub payment_id: Option<PaymentId>,
}

impl Output {
    pub fn mask(&self) -> Option<&[u8; 32]> {
        self.extra.is_ringct().then_some(&self.ringct_mask)
    }
}

impl Record for Output {
    const SIZE: usize = 214;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.spend_meta.write_to(out);
        self.link.write_to(out);
        self.account.write_to(out);
        self.timestamp.write_to(out);
        self.unlock_time.write_to(out);
        self.tx_prefix_hash.write_to(out);
        self.ringct_mask.write_to(out);
        self.extra.write_to(out);
        self.payment_id.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self {
            spend_meta: r.read(),
            link: r.read(),
            account: r.read(),
            timestamp: r.read(),
            unlock_time: r.read(),
            tx_prefix_hash: r.read(),
            ringct_mask: r.read(),
            extra: r.read(),
            payment_id: r.read(),
        }
    }
}

/// A (possible) spend of one of the account's outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Spend {
    /// The output being spent.
    pub source: OutputId,
    /// The spending transaction.
    pub link: TransactionLink,
    pub image: Hash256,
    pub mixin_count: u32,
    pub timestamp: u64,
    pub unlock_time: u64,
    pub account: AccountId,
}

impl Record for Spend {
    const SIZE: usize = 104;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.source.write_to(out);
        self.link.write_to(out);
        self.image.write_to(out);
        self.mixin_count.write_to(out);
        self.timestamp.write_to(out);
        self.unlock_time.write_to(out);
        self.account.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self {
            source: r.read(),
            link: r.read(),
            image: r.read(),
            mixin_count: r.read(),
            timestamp: r.read(),
            unlock_time: r.read(),
            account: r.read(),
        }
    }
}

/// Key image seen for an output, independent of spend confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct KeyImage {
    pub output: OutputId,
    pub account: AccountId,
    pub image: Hash256,
    pub link: TransactionLink,
}

impl Record for KeyImage {
    const SIZE: usize = 84;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.output.write_to(out);
        self.account.write_to(out);
        self.image.write_to(out);
        self.link.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self { output: r.read(), account: r.read(), image: r.read(), link: r.read() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub id: BlockId,
    pub hash: Hash256,
}

impl Record for BlockInfo {
    const SIZE: usize = 40;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.id.write_to(out);
        self.hash.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self { id: r.read(), hash: r.read() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    Create = 0,
    ImportScan = 1,
}

impl Record for RequestKind {
    const SIZE: usize = 1;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn read_from(bytes: &[u8]) -> Self {
        match bytes[0] {
            0 => Self::Create,
            _ => Self::ImportScan,
        }
    }
}

/// A pending out-of-band request. Import requests carry a zero view key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestInfo {
    pub address: AccountAddress,
    pub view_key: ViewKey,
    pub start_height: BlockId,
    pub creation_time: u64,
}

impl Record for RequestInfo {
    const SIZE: usize = 112;

    fn write_to(&self, out: &mut Vec<u8>) {
        self.address.write_to(out);
        self.view_key.write_to(out);
        self.start_height.write_to(out);
        self.creation_time.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut r = RecordReader::new(bytes);
        Self {
            address: r.read(),
            view_key: r.read(),
            start_height: r.read(),
            creation_time: r.read(),
        }
    }
}

record_field!(pub OutputSpendMeta: Output => SpendMeta, offset = 0);
record_field!(pub OutputAmount: Output => u64, offset = 8);
record_field!(pub OutputLink: Output => TransactionLink, offset = 56);
record_field!(pub OutputUnlockTime: Output => u64, offset = 108);
record_field!(pub OutputExtra: Output => Extra, offset = 180);
record_field!(pub SpendSource: Spend => OutputId, offset = 0);
record_field!(pub SpendLink: Spend => TransactionLink, offset = 8);
record_field!(pub KeyImageValue: KeyImage => Hash256, offset = 12);
