//! Parse the header block of the final HTTP response.

/// `Content-Range` value. `range` is `None` for the unsatisfied form `bytes */N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub(crate) range: Option<(u64, u64)>,
    pub(crate) total: Option<u64>,
}

/// Status line and the size-related headers of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub(crate) status: Option<u32>,
    pub(crate) content_length: Option<u64>,
    pub(crate) content_range: Option<ContentRange>,
}

impl ResponseHead {
    pub(crate) fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }

    /// Full resource size as announced by this response, given that the body
    /// starts at byte `offset` of the file.
    pub(crate) fn total_size(&self, offset: u64) -> Option<u64> {
        if let Some(total) = self.content_range.and_then(|cr| cr.total) {
            return Some(total);
        }
        let len = self.content_length?;
        if self.status == Some(206) {
            Some(offset + len)
        } else {
            Some(len)
        }
    }

    /// First body byte of a `206` response, from its `Content-Range`.
    pub(crate) fn partial_start(&self) -> Option<u64> {
        if self.status != Some(206) {
            return None;
        }
        self.content_range
            .and_then(|cr| cr.range)
            .map(|(start, _)| start)
    }

    /// `N` from a `416` response carrying `Content-Range: bytes */N`.
    pub(crate) fn unsatisfied_total(&self) -> Option<u64> {
        if self.status != Some(416) {
            return None;
        }
        self.content_range
            .filter(|cr| cr.range.is_none())
            .and_then(|cr| cr.total)
    }
}

/// Parse collected header lines. A status line resets everything seen before
/// it, so after redirects only the last response counts.
pub(crate) fn parse_head(lines: &[String]) -> ResponseHead {
    let mut head = ResponseHead::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            head = ResponseHead {
                status: line.split_whitespace().nth(1).and_then(|s| s.parse().ok()),
                ..ResponseHead::default()
            };
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                head.content_length = value.parse().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                head.content_range = parse_content_range(value);
            }
        }
    }
    head
}

/// `bytes 100-999/1000`, `bytes 100-999/*` or `bytes */1000`.
fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    let range = match range.trim() {
        "*" => None,
        r => {
            let (start, end) = r.split_once('-')?;
            Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
        }
    };
    Some(ContentRange { range, total })
}
