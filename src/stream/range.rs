use http_range_header::parse_range_header;

/// The byte range a session will deliver. `end` is inclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ByteRange {
    /// The whole resource, status 200.
    Full,
    /// A sub-range, status 206 with Content-Range.
    Partial { start: u64, end: u64 },
}

impl ByteRange {
    /// Negotiate the range for a resource of `total` bytes.
    ///
    /// Only the first range of a multi-range request is honored. Anything that
    /// does not parse or cannot be satisfied falls back to the full resource
    /// instead of a 416.
    pub fn negotiate(header: Option<&str>, total: u64) -> Self {
        let Some(header) = header else {
            return ByteRange::Full;
        };
        if total == 0 {
            return ByteRange::Full;
        }
        let ranges = match parse_range_header(header).map(|p| p.validate(total)) {
            Ok(Ok(ranges)) => ranges,
            Ok(Err(e)) => {
                tracing::debug!("Unsatisfiable range {:?} for {} bytes ({:?}), sending all", header, total, e);
                return ByteRange::Full;
            }
            Err(e) => {
                tracing::debug!("Malformed range {:?} ({:?}), sending all", header, e);
                return ByteRange::Full;
            }
        };
        match ranges.into_iter().next() {
            Some(r) => ByteRange::Partial { start: *r.start(), end: *r.end() },
            None => ByteRange::Full,
        }
    }

    pub fn start(&self) -> u64 {
        match self {
            ByteRange::Full => 0,
            ByteRange::Partial { start, .. } => *start,
        }
    }

    /// Number of bytes delivered out of `total`.
    pub fn len(&self, total: u64) -> u64 {
        match self {
            ByteRange::Full => total,
            ByteRange::Partial { start, end } => end - start + 1,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, ByteRange::Partial { .. })
    }

    /// `bytes start-end/total` for a partial range.
    pub fn content_range(&self, total: u64) -> Option<String> {
        match self {
            ByteRange::Full => None,
            ByteRange::Partial { start, end } => Some(format!("bytes {}-{}/{}", start, end, total)),
        }
    }
}
