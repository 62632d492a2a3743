use std::error::Error as StdError;

/// Custom Result type for bamseek operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the bamseek library, encompassing all possible error cases
/// that can occur while reading or writing compressed alignment containers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors raised by the block compression layer
    #[error("Error processing BGZF block: {0}")]
    BlockError(#[from] BlockError),

    /// Errors related to the spatial index
    #[error("Error processing index: {0}")]
    IndexError(#[from] IndexError),

    /// Errors raised while decoding or encoding a single alignment record
    #[error("Error processing record: {0}")]
    RecordError(#[from] RecordError),

    /// Errors related to the container header
    #[error("Error processing header: {0}")]
    HeaderError(#[from] HeaderError),

    /// Errors related to indexed reference lookup
    #[error("Error processing FASTA: {0}")]
    FastaError(#[from] FastaError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error means the stream ended before it should have
    ///
    /// This covers both a missing end-of-file marker block and a record
    /// that was cut off mid-way.
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        match self {
            Self::BlockError(err) => matches!(err, BlockError::TruncatedStream(_)),
            Self::RecordError(err) => matches!(err, RecordError::TruncatedRecord { .. }),
            Self::IoError(err) => err.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }

    /// Checks if the error is a format violation of the index file
    #[must_use]
    pub fn is_malformed_index(&self) -> bool {
        matches!(
            self,
            Self::IndexError(IndexError::MalformedIndex(_) | IndexError::InvalidMagic(_))
        )
    }

    /// Checks if the error only concerns a single record
    ///
    /// Record-scoped errors leave the reader positioned at the following record.
    #[must_use]
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            Self::RecordError(
                RecordError::UnknownTagType { .. }
                    | RecordError::UnsupportedFieldWidth { .. }
                    | RecordError::InvalidCigarOp(_)
                    | RecordError::MalformedTag(_)
            )
        )
    }
}

/// Errors raised by the BGZF block codec
#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    /// The block did not start with the gzip/BGZF signature
    ///
    /// The parameter is the compressed file offset of the block
    #[error("Invalid BGZF magic at compressed offset {0}")]
    InvalidMagic(u64),

    /// The block header, payload, or trailer failed validation
    #[error("Malformed BGZF block at compressed offset {offset}: {reason}")]
    MalformedBlock { offset: u64, reason: String },

    /// The stream ended without the end-of-file marker block, or mid-block
    ///
    /// The parameter is the compressed offset where the stream ended
    #[error(
        "Stream ended at compressed offset {0} without an EOF marker block - possibly truncated"
    )]
    TruncatedStream(u64),

    /// A block could not be shrunk enough to fit the maximum block size
    #[error("Unable to fit {0} bytes of input into a single block")]
    BlockTooLarge(usize),
}

/// Errors related to the spatial index
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The index did not start with the expected signature
    #[error("Invalid index magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// The index body violated the expected layout
    #[error("Malformed index: {0}")]
    MalformedIndex(String),

    /// A region jump was requested on a reader without an index
    #[error("No index is attached to this reader - a region jump requires one")]
    MissingIndex,
}

/// Errors raised while decoding or encoding one alignment record
///
/// These are scoped to a single record and never disturb the reader position.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    /// The record payload is shorter than its own fields declare
    #[error("Record is truncated: needs {expected} bytes but only {actual} are present")]
    TruncatedRecord { expected: usize, actual: usize },

    /// An auxiliary field carried a type code outside the known set
    #[error("Unknown type code {type_code:?} for auxiliary tag {tag}")]
    UnknownTagType { tag: String, type_code: char },

    /// An auxiliary array carried an element type without a known width
    #[error("Unsupported array element type {subtype:?} for auxiliary tag {tag}")]
    UnsupportedFieldWidth { tag: String, subtype: char },

    /// An auxiliary field ran past the end of the record
    #[error("Malformed auxiliary data: {0}")]
    MalformedTag(String),

    /// A CIGAR operation code outside the nine defined kinds
    #[error("Invalid CIGAR operation code: {0}")]
    InvalidCigarOp(u32),

    /// A CIGAR string could not be parsed
    #[error("Invalid CIGAR string: {0}")]
    InvalidCigarString(String),

    /// A sequence symbol outside the 16-symbol nucleotide alphabet
    #[error("Invalid nucleotide symbol: {0:?}")]
    InvalidBase(char),

    /// The read name does not fit the 8-bit length field
    #[error("Read name is {0} bytes long, but at most 254 are supported")]
    NameTooLong(usize),

    /// The CIGAR does not fit the 16-bit operation count field
    #[error("CIGAR has {0} operations, but at most 65535 are supported")]
    TooManyCigarOps(usize),

    /// A CIGAR operation longer than its 28-bit length field can hold
    #[error("CIGAR operation length {0} exceeds the maximum of 268435455")]
    CigarOpTooLong(u32),

    /// The fixed header declares a negative sequence length
    #[error("Invalid sequence length: {0}")]
    InvalidSequenceLength(i32),

    /// Quality scores and sequence disagree in length
    #[error("Quality length ({quality}) does not match sequence length ({sequence})")]
    QualityLengthMismatch { sequence: usize, quality: usize },
}

/// Errors related to the container header
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The container did not start with the expected signature
    #[error("Invalid container magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// A negative length or count was found in the header
    #[error("Invalid {field} in header: {value}")]
    InvalidLength { field: &'static str, value: i32 },

    /// A text header line could not be parsed
    #[error("Malformed header line: {0}")]
    MalformedRecord(String),
}

/// Errors related to indexed FASTA lookups
#[derive(thiserror::Error, Debug)]
pub enum FastaError {
    /// A `.fai` line did not carry the five expected fields
    #[error("Malformed FASTA index line: {0}")]
    MalformedIndexLine(String),

    /// A sequence line appeared before any `>` name line
    #[error("Unexpected sequence data at byte {0} before any sequence name")]
    UnexpectedSequence(u64),

    /// The sequence is wrapped with inconsistent line widths
    #[error("Inconsistent line width in sequence {0}")]
    InconsistentLineWidth(String),

    /// The requested sequence is not present in the index
    #[error("Unknown sequence name: {0}")]
    UnknownSequence(String),

    /// The requested start position lies beyond the sequence
    #[error("Position {position} is beyond the end of {name} (length {length})")]
    OutOfRange {
        name: String,
        position: u64,
        length: u64,
    },

    /// More bases were requested than the whole sequence holds
    #[error("Requested {requested} bases from {name}, which is only {length} long")]
    RequestTooLong {
        name: String,
        requested: u64,
        length: u64,
    },
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoBamError {
    fn into_bam_error(self) -> Error;
}

impl<E> IntoBamError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_bam_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}
