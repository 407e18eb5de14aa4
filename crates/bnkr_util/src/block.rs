macro_rules! impl_block {
    ($t:ident) => {
        impl Block for $t {
            fn block_addr(self, block_size: Self) -> Self {
                self - self % block_size
            }

            fn block_offset(self, block_size: Self) -> Self {
                self % block_size
            }

            fn is_block_aligned(self, block_size: Self) -> bool {
                self % block_size == 0
            }

            fn spans_blocks(self, size: Self, block_size: Self) -> bool {
                self.block_offset(block_size) + size > block_size
            }
        }
    }
}

impl_block!(u64);
impl_block!(u32);
impl_block!(usize);

/// Trait to split an address into block address and offset. The block size doesn't have to be a
/// power of two.
pub trait Block: Sized {
    /// The address of the first byte in the block containing `self`.
    #[must_use]
    fn block_addr(self, block_size: Self) -> Self;

    /// Byte offset of `self` into it's block.
    #[must_use]
    fn block_offset(self, block_size: Self) -> Self;

    fn is_block_aligned(self, block_size: Self) -> bool;

    /// If an access of `size` bytes starting at `self` would touch more than one block.
    fn spans_blocks(self, size: Self, block_size: Self) -> bool;
}

#[test]
fn test_block_addr() {
    assert_eq!(0x1000_u64.block_addr(64), 0x1000);
    assert_eq!(0x103f_u64.block_addr(64), 0x1000);
    assert_eq!(0x1040_u64.block_addr(64), 0x1040);
    assert_eq!(10_u64.block_addr(3), 9);
}

#[test]
fn test_spans_blocks() {
    assert!(!0x1000_u64.spans_blocks(64, 64));
    assert!(!0x1038_u64.spans_blocks(8, 64));
    assert!(0x1039_u64.spans_blocks(8, 64));
    assert!(0x1001_u64.spans_blocks(64, 64));
}
