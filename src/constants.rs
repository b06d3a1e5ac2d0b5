/// Well-known burn sinks
///
/// A token whose owner resolves to one of these is treated as deleted.
pub mod sinks {
    use alloy_primitives::{address, Address};

    /// The zero address
    pub const ZERO: Address = Address::ZERO;
    /// Conventional `0x...dEaD` burn address
    pub const DEAD: Address = address!("000000000000000000000000000000000000dEaD");

    /// Whether `owner` is a burn sink
    pub fn is_burn_sink(owner: &Address) -> bool {
        *owner == ZERO || *owner == DEAD
    }
}

/// ERC-165 interface identifiers
pub mod interfaces {
    /// ERC-721 Enumerable (`tokenByIndex`, `tokenOfOwnerByIndex`)
    pub const ERC721_ENUMERABLE: [u8; 4] = [0x78, 0x0e, 0x9d, 0x63];
}

/// Cache namespaces
pub mod namespaces {
    pub const CONTRACT: &str = "contract";
    pub const METADATA: &str = "metadata";
    pub const DISCOVERY: &str = "discovery";
}
