//! Remote listing entries

/// File type derived from the first character of a listing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEntryKind {
    Directory,
    Block,
    Character,
    SymbolicLink,
    Fifo,
    Socket,
    Regular,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub kind: RemoteEntryKind,
    /// Not decoded yet; always zero.
    pub permissions: u32,
    pub links: u32,
    pub owner: String,
    /// Can be characters or a number.
    pub group: String,
    pub size: u64,
    /// The three date/time tokens of the listing line, joined verbatim.
    pub timestamp: String,
    pub name: String,
}
