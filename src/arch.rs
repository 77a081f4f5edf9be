use std::ops::Range;

use crate::result::*;

/// A checked cast from u64 to usize
///
/// We could use the `cast` crate,
/// (https://docs.rs/cast/0.2.3/cast/)
/// but this is the only one we really need.
pub fn usize<I: Into<u64>>(i: I) -> PackResult<usize> {
    let i: u64 = i.into();
    if cfg!(target_pointer_width = "64") {
        Ok(i as usize)
    } else if i > usize::MAX as u64 {
        Err(PackError::InsufficientAddressSpace)
    } else {
        Ok(i as usize)
    }
}

/// Turns an (offset, length) pair read from a package into a range,
/// making sure the whole thing fits inside a buffer of `buffer_len` bytes.
///
/// `what` names the region for the error message.
pub fn checked_range(
    offset: u64,
    length: u64,
    buffer_len: usize,
    what: &str,
) -> PackResult<Range<usize>> {
    let end = offset.checked_add(length).ok_or_else(|| {
        PackError::OutOfBounds(format!("{what} at {offset:#x} + {length:#x} overflows"))
    })?;
    if end > buffer_len as u64 {
        return Err(PackError::OutOfBounds(format!(
            "{what} at {offset:#x} + {length:#x} past end of package ({buffer_len:#x})"
        )));
    }
    Ok(usize(offset)?..usize(end)?)
}

/// Number of zero bytes needed to bring `position` up to a multiple of `alignment`.
pub fn padding_for(position: u64, alignment: u64) -> u64 {
    (alignment - position % alignment) % alignment
}
