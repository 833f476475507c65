use super::Layout;

pub type ParseResult<T> = core::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed {layout} packet: needed {needed} bytes, got {available}")]
    MalformedPacket {
        layout: Layout,
        needed: usize,
        available: usize,
    },
    #[error("value {value} does not fit in {bits} bits")]
    FieldOverflow { value: u32, bits: u32 },
    #[error("control message contains non-ascii byte 0x{0:02x}")]
    NonAscii(u8),
}
