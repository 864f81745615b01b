//! Rolling output window, full transcript and display chunking

use std::collections::VecDeque;

/// Upper bound on what the display window retains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCapacity {
    /// Keep at most this many lines
    Lines(usize),
    /// Keep at most this many characters, counting one per line break
    Chars(usize),
}

/// Window text prepared for a display surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedWindow {
    /// Window lines joined with `\n`
    pub text: String,
    /// Whether older lines were dropped to fit a display ceiling
    pub truncated: bool,
}

/// Bounded display window plus an unbounded transcript.
///
/// Every appended line lands in both. The window evicts its oldest lines once
/// over capacity; the transcript keeps everything until it is taken.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    window: VecDeque<String>,
    window_chars: usize,
    capacity: WindowCapacity,
    transcript: Vec<String>,
    truncated: bool,
}

impl RollingBuffer {
    /// Create a buffer with the given window capacity
    #[must_use]
    pub fn new(capacity: WindowCapacity) -> Self {
        Self {
            window: VecDeque::new(),
            window_chars: 0,
            capacity,
            transcript: Vec::new(),
            truncated: false,
        }
    }

    /// Window bounded by line count
    #[must_use]
    pub fn with_lines(lines: usize) -> Self {
        Self::new(WindowCapacity::Lines(lines))
    }

    /// Window bounded by character count
    #[must_use]
    pub fn with_chars(chars: usize) -> Self {
        Self::new(WindowCapacity::Chars(chars))
    }

    /// Append a line to the window and the transcript
    pub fn append(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.transcript.push(line.clone());
        self.window_chars += weight(&line);
        self.window.push_back(line);

        while self.over_capacity() {
            self.evict_oldest();
        }
    }

    fn over_capacity(&self) -> bool {
        match self.capacity {
            WindowCapacity::Lines(max) => self.window.len() > max,
            WindowCapacity::Chars(max) => self.window_chars() > max,
        }
    }

    fn evict_oldest(&mut self) -> bool {
        match self.window.pop_front() {
            Some(line) => {
                self.window_chars -= weight(&line);
                true
            }
            None => false,
        }
    }

    /// Lines currently in the window, oldest first
    pub fn window(&self) -> impl Iterator<Item = &str> {
        self.window.iter().map(String::as_str)
    }

    /// Number of lines in the window
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Characters in the joined window text
    #[must_use]
    pub fn window_chars(&self) -> usize {
        self.window_chars.saturating_sub(usize::from(!self.window.is_empty()))
    }

    /// Every line appended since creation or the last [`take_transcript`](Self::take_transcript)
    #[must_use]
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Move the transcript out, leaving it empty
    pub fn take_transcript(&mut self) -> Vec<String> {
        std::mem::take(&mut self.transcript)
    }

    /// Whether the window was ever cut down to fit a display ceiling
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Render the window, dropping oldest lines until it fits `ceiling` chars.
    pub fn render_window(&mut self, ceiling: usize) -> RenderedWindow {
        while self.window_chars() > ceiling && self.evict_oldest() {
            self.truncated = true;
        }

        let mut text = String::with_capacity(self.window_chars);
        for (i, line) in self.window.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            text.push_str(line);
        }

        RenderedWindow {
            text,
            truncated: self.truncated,
        }
    }

    /// Render the window followed by `tail`, a line still waiting for its
    /// line break (a prompt, say). The tail is shown but not recorded; when
    /// it alone exceeds `ceiling`, only its last `ceiling` chars are shown.
    pub fn render_with_tail(&mut self, ceiling: usize, tail: &str) -> RenderedWindow {
        if tail.is_empty() {
            return self.render_window(ceiling);
        }

        let tail_chars = tail.chars().count();
        if tail_chars >= ceiling {
            let text: String = tail.chars().skip(tail_chars - ceiling).collect();
            return RenderedWindow {
                text,
                truncated: true,
            };
        }

        // One char for the joining line break
        let mut rendered = self.render_window(ceiling - tail_chars - 1);
        if !rendered.text.is_empty() {
            rendered.text.push('\n');
        }
        rendered.text.push_str(tail);
        rendered
    }
}

fn weight(line: &str) -> usize {
    line.chars().count() + 1
}

/// Split `text` into consecutive pieces of at most `limit` characters.
///
/// Yields `ceil(chars / limit)` pieces whose concatenation is `text`. A limit
/// of zero is treated as one. Clone the iterator to restart it.
pub fn chunk(text: &str, limit: usize) -> Chunks<'_> {
    Chunks {
        rest: text,
        limit: limit.max(1),
    }
}

/// Iterator returned by [`chunk`]
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    limit: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .char_indices()
            .nth(self.limit)
            .map_or(self.rest.len(), |(i, _)| i);
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(head)
    }
}
