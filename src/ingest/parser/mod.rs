// SPDX-License-Identifier: Apache-2.0

//! Line parsers, one per source type.
//!
//! Each parser turns a raw line into an [`Event`] or `None`. Lines that are
//! not valid JSON, or that lack the fields a format requires, are skipped
//! without an error so one bad record never fails a whole file.
//!
//! # Available Parsers
//!
//! - [`SystemLogParser`] - structured runtime logs (`log`, `log:<subsystem>`)
//! - [`CacheTraceParser`] - cache-trace stream (`cache:<stage>`)
//! - [`SessionParser`] - session transcripts (`session:*`)

mod cache_trace;
mod fields;
mod session;
mod system_log;

pub use cache_trace::CacheTraceParser;
pub use session::{SessionParser, agent_id_from_path, session_id_from_path};
pub use system_log::{SystemLogParser, level_name};

use crate::ingest::event::{Event, SourceType};

/// The parser for one source type
#[derive(Debug, Clone, Copy)]
pub enum LineParser {
    SystemLog(SystemLogParser),
    CacheTrace(CacheTraceParser),
    Session(SessionParser),
}

impl LineParser {
    /// Select the parser for a source type
    pub fn for_source(source_type: SourceType) -> Self {
        match source_type {
            SourceType::SystemLog => LineParser::SystemLog(SystemLogParser),
            SourceType::CacheTrace => LineParser::CacheTrace(CacheTraceParser),
            SourceType::Session => LineParser::Session(SessionParser),
        }
    }

    #[cfg(test)]
    fn source_type(&self) -> SourceType {
        match self {
            LineParser::SystemLog(_) => SourceType::SystemLog,
            LineParser::CacheTrace(_) => SourceType::CacheTrace,
            LineParser::Session(_) => SourceType::Session,
        }
    }

    /// Parse one line read from `source_file`
    pub fn parse_line(&self, line: &str, source_file: &str) -> Option<Event> {
        match self {
            LineParser::SystemLog(p) => p.parse_line(line, source_file),
            LineParser::CacheTrace(p) => p.parse_line(line, source_file),
            LineParser::Session(p) => p.parse_line(line, source_file),
        }
    }

    /// Parse a batch of lines, dropping the ones that do not parse
    pub fn parse_all<'a, I>(&self, lines: I, source_file: &str) -> Vec<Event>
    where
        I: IntoIterator<Item = &'a String>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.parse_line(line, source_file))
            .collect()
    }
}
