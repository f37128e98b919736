//! Runtime value tagging.
//!
//! Every runtime value is one machine word. The low [`TAG_BITS`] bits carry
//! the type tag and the rest the payload. Integers are stored shifted left so
//! that addition and subtraction work directly on tagged words, which is what
//! lets the optimizer drop runtime assertions once a value is proven to be an
//! integer.

/// Number of low bits reserved for the tag
pub const TAG_BITS: u32 = 3;

/// Mask selecting the tag bits
pub const TAG_MASK: u64 = (1 << TAG_BITS) - 1;

pub const INTEGER_TAG: u64 = 0b000;
pub const BOOLEAN_TAG: u64 = 0b001;
pub const NONE_TAG: u64 = 0b010;
pub const POINTER_TAG: u64 = 0b100;

/// Payload bit that distinguishes `true` from `false`
pub const BOOLEAN_PAYLOAD_BIT: u64 = 1 << TAG_BITS;

pub const FALSE: u64 = BOOLEAN_TAG;
pub const TRUE: u64 = BOOLEAN_PAYLOAD_BIT | BOOLEAN_TAG;
pub const NONE: u64 = NONE_TAG;

/// Decoded tag of a runtime word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Integer,
    Boolean,
    None,
    Pointer,
}

/// Classify a tagged word. Unknown tags are treated as heap pointers.
pub fn tag_of(word: u64) -> Tag {
    match word & TAG_MASK {
        INTEGER_TAG => Tag::Integer,
        BOOLEAN_TAG => Tag::Boolean,
        NONE_TAG => Tag::None,
        _ => Tag::Pointer,
    }
}

pub fn encode_int(value: i64) -> u64 {
    (value << TAG_BITS) as u64
}

pub fn decode_int(word: u64) -> i64 {
    (word as i64) >> TAG_BITS
}

pub fn encode_bool(value: bool) -> u64 {
    if value {
        TRUE
    } else {
        FALSE
    }
}

pub fn decode_bool(word: u64) -> bool {
    word & BOOLEAN_PAYLOAD_BIT != 0
}

/// Truncate an integer to the payload width, as tagged arithmetic would.
pub fn wrap_int(value: i64) -> i64 {
    (value << TAG_BITS) >> TAG_BITS
}
