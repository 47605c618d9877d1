//! Parser for LRC-style timestamped lyrics.
//!
//! Each line may carry any number of `[mm:ss]`, `[mm:ss.xx]` or `[mm:ss:xx]`
//! tokens anywhere in it. Every token produces one [`LyricLine`] sharing the
//! line's remaining text.

/// A single line of lyrics with its start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub time_ms: u64,
    /// Never empty
    pub text: String,
}

impl LyricLine {
    #[must_use]
    pub fn new(time_ms: u64, text: impl Into<String>) -> Self {
        Self {
            time_ms,
            text: text.into(),
        }
    }
}

/// LRC metadata from ID tags. Tag lines never become lyric lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricsMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub author: Option<String>,
}

/// Parsed lyrics: lines sorted by time, ties kept in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lyrics {
    pub metadata: LyricsMetadata,
    pub lines: Vec<LyricLine>,
}

impl Lyrics {
    /// Parse LRC text. Never fails; unrecognised lines are skipped.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut metadata = LyricsMetadata::default();
        let mut lines = Vec::new();

        for raw in input.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let (timestamps, text) = strip_timestamps(line);

            // Whatever still looks like a bracketed key:value is a tag, not a lyric
            if text.starts_with('[') && text.contains(':') {
                if timestamps.is_empty() {
                    apply_id_tag(&text, &mut metadata);
                }
                continue;
            }
            if text.is_empty() {
                continue;
            }

            lines.extend(timestamps.into_iter().map(|time_ms| LyricLine {
                time_ms,
                text: text.clone(),
            }));
        }

        // sort_by_key is stable: equal timestamps keep their source order
        lines.sort_by_key(|l| l.time_ms);

        Self { metadata, lines }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the last line starting at or before `t_ms`
    #[must_use]
    pub fn current_index(&self, t_ms: u64) -> Option<usize> {
        self.started_count(t_ms).checked_sub(1)
    }

    /// The current line (latest start ≤ `t_ms`) and the next one (first start > `t_ms`)
    #[must_use]
    pub fn current_and_next(&self, t_ms: u64) -> (Option<&LyricLine>, Option<&LyricLine>) {
        let started = self.started_count(t_ms);
        let current = started.checked_sub(1).and_then(|i| self.lines.get(i));
        (current, self.lines.get(started))
    }

    /// Lines around the current one, each tagged with whether it is current.
    ///
    /// Before the first timestamp the first line anchors the window and is
    /// the one tagged current. Empty lyrics give an empty window.
    #[must_use]
    pub fn window(&self, t_ms: u64, before: usize, after: usize) -> Vec<(&LyricLine, bool)> {
        if self.lines.is_empty() {
            return Vec::new();
        }
        let anchor = self.current_index(t_ms).unwrap_or(0);
        let start = anchor.saturating_sub(before);
        let end = anchor.saturating_add(after).min(self.lines.len() - 1);

        (start..=end)
            .map(|i| (&self.lines[i], i == anchor))
            .collect()
    }

    /// Number of lines whose start time is ≤ `t_ms`
    fn started_count(&self, t_ms: u64) -> usize {
        self.lines.partition_point(|l| l.time_ms <= t_ms)
    }
}

/// Remove every timestamp token from `line`, returning their values in
/// order of appearance and the trimmed remaining text.
fn strip_timestamps(line: &str) -> (Vec<u64>, String) {
    let mut timestamps = Vec::new();
    let mut text = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find('[') {
        text.push_str(&rest[..open]);
        let candidate = &rest[open..];
        if let Some((time_ms, consumed)) = parse_timestamp_token(candidate) {
            timestamps.push(time_ms);
            rest = &candidate[consumed..];
        } else {
            text.push('[');
            rest = &candidate[1..];
        }
    }
    text.push_str(rest);

    (timestamps, text.trim().to_string())
}

/// Parse a token like `[01:02]`, `[01:02.34]`, `[01:02:345]` at the start of `s`.
///
/// Returns the time in milliseconds and the token's byte length.
fn parse_timestamp_token(s: &str) -> Option<(u64, usize)> {
    let close = s.find(']')?;
    let body = s.get(1..close)?;

    let (minutes, rest) = body.split_once(':')?;
    if minutes.is_empty() || !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let (seconds, fraction) = match rest.find(['.', ':']) {
        Some(sep) => (&rest[..sep], Some(&rest[sep + 1..])),
        None => (rest, None),
    };
    if seconds.len() != 2 || !seconds.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let millis = match fraction {
        None => 0,
        Some(f) if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) => return None,
        Some(f) => fraction_millis(f)?,
    };

    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    let time_ms = minutes
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(1000)?
        .checked_add(millis)?;

    Some((time_ms, close + 1))
}

/// One or two digits are hundredths, three are milliseconds, extra digits are ignored.
fn fraction_millis(digits: &str) -> Option<u64> {
    match digits.len() {
        1 | 2 => digits.parse::<u64>().ok().map(|v| v * 10),
        _ => digits.get(..3)?.parse().ok(),
    }
}

/// Record an ID tag like `[ti:Title]` or `[ar:Artist]`
fn apply_id_tag(line: &str, metadata: &mut LyricsMetadata) {
    let Some(end) = line.find(']') else {
        return;
    };
    let Some((key, value)) = line[1..end].split_once(':') else {
        return;
    };
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let value = Some(value.to_string());
    match key.trim().to_lowercase().as_str() {
        "ti" => metadata.title = value,
        "ar" => metadata.artist = value,
        "al" => metadata.album = value,
        "au" | "by" => metadata.author = value,
        _ => {} // Ignore unknown tags
    }
}
