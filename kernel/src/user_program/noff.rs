//! The NOFF executable format: a 40 byte header followed by the code and
//! initialized data segments.

use alloc::vec::Vec;
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};
use nom::number::complete::u32;
use nom::number::Endianness;
use nom::IResult;

pub const NOFF_MAGIC: u32 = 0x00ba_dfad;
pub const NOFF_HEADER_SIZE: usize = 40;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoffEndianness {
    Little,
    Big,
}

impl NoffEndianness {
    fn to_nom(self) -> Endianness {
        match self {
            NoffEndianness::Little => Endianness::Little,
            NoffEndianness::Big => Endianness::Big,
        }
    }

    fn word(self, value: u32) -> [u8; 4] {
        match self {
            NoffEndianness::Little => value.to_le_bytes(),
            NoffEndianness::Big => value.to_be_bytes(),
        }
    }
}

pub enum NoffError {
    /// The image is shorter than its header claims
    Truncated,
    /// The image doesn't start with the magic number in either byte order
    BadMagic(u32),
    /// A segment is too large to describe in a header
    TooLarge,
}

impl Debug for NoffError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            NoffError::Truncated => write!(f, "Truncated"),
            NoffError::BadMagic(magic) => write!(f, "BadMagic({magic:#010x})"),
            NoffError::TooLarge => write!(f, "TooLarge"),
        }
    }
}

impl Display for NoffError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            NoffError::Truncated => write!(f, "executable is truncated"),
            NoffError::BadMagic(magic) => write!(f, "bad NOFF magic {magic:#010x}"),
            NoffError::TooLarge => write!(f, "segment too large for a NOFF header"),
        }
    }
}

impl Error for NoffError {}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    pub virtual_addr: u32,
    pub in_file_addr: u32,
    pub size: u32,
}

impl Segment {
    fn parse(bytes: &[u8], endian: Endianness) -> IResult<&[u8], Segment> {
        let (bytes, virtual_addr) = u32(endian)(bytes)?;
        let (bytes, in_file_addr) = u32(endian)(bytes)?;
        let (bytes, size) = u32(endian)(bytes)?;

        Ok((
            bytes,
            Segment {
                virtual_addr,
                in_file_addr,
                size,
            },
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The segment's contents within `image`.
    pub fn bytes<'a>(&self, image: &'a [u8]) -> Result<&'a [u8], NoffError> {
        let start = self.in_file_addr as usize;
        let end = start
            .checked_add(self.size as usize)
            .ok_or(NoffError::Truncated)?;
        image.get(start..end).ok_or(NoffError::Truncated)
    }

    /// One past the last virtual address the segment covers.
    pub fn virtual_end(&self) -> usize {
        self.virtual_addr as usize + self.size as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NoffHeader {
    pub endianness: NoffEndianness,
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl NoffHeader {
    fn parse_as(bytes: &[u8], endianness: NoffEndianness) -> IResult<&[u8], (u32, NoffHeader)> {
        let endian = endianness.to_nom();
        let (bytes, magic) = u32(endian)(bytes)?;
        let (bytes, code) = Segment::parse(bytes, endian)?;
        let (bytes, init_data) = Segment::parse(bytes, endian)?;
        let (bytes, uninit_data) = Segment::parse(bytes, endian)?;

        Ok((
            bytes,
            (
                magic,
                NoffHeader {
                    endianness,
                    code,
                    init_data,
                    uninit_data,
                },
            ),
        ))
    }

    /// Parses the header in the machine's byte order, falling back to the
    /// swapped order when the magic number only matches that way.
    pub fn parse(image: &[u8]) -> Result<NoffHeader, NoffError> {
        let mut native_magic = None;
        for endianness in [NoffEndianness::Little, NoffEndianness::Big] {
            let (_, (magic, header)) =
                Self::parse_as(image, endianness).map_err(|_| NoffError::Truncated)?;
            if magic == NOFF_MAGIC {
                return Ok(header);
            }
            native_magic.get_or_insert(magic);
        }
        Err(NoffError::BadMagic(native_magic.unwrap_or_default()))
    }
}

/// Builds a NOFF image with `code` at virtual address 0, `init_data` right
/// after it and `uninit_size` bytes of uninitialized data after that.
pub fn assemble(
    code: &[u8],
    init_data: &[u8],
    uninit_size: usize,
    endianness: NoffEndianness,
) -> Result<Vec<u8>, NoffError> {
    let size = |len: usize| u32::try_from(len).map_err(|_| NoffError::TooLarge);
    let code_size = size(code.len())?;
    let data_size = size(init_data.len())?;
    let header_size = size(NOFF_HEADER_SIZE)?;

    let code_segment = Segment {
        virtual_addr: 0,
        in_file_addr: header_size,
        size: code_size,
    };
    let data_segment = Segment {
        virtual_addr: code_size,
        in_file_addr: header_size
            .checked_add(code_size)
            .ok_or(NoffError::TooLarge)?,
        size: data_size,
    };
    let uninit_segment = Segment {
        virtual_addr: code_size
            .checked_add(data_size)
            .ok_or(NoffError::TooLarge)?,
        in_file_addr: 0,
        size: size(uninit_size)?,
    };

    let mut image = Vec::with_capacity(NOFF_HEADER_SIZE + code.len() + init_data.len());
    image.extend_from_slice(&endianness.word(NOFF_MAGIC));
    for segment in [code_segment, data_segment, uninit_segment] {
        image.extend_from_slice(&endianness.word(segment.virtual_addr));
        image.extend_from_slice(&endianness.word(segment.in_file_addr));
        image.extend_from_slice(&endianness.word(segment.size));
    }
    image.extend_from_slice(code);
    image.extend_from_slice(init_data);

    Ok(image)
}
