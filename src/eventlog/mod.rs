//! Per-session event log
//!
//! Plain text, one comma-separated event per line, appended in the order the
//! events happened:
//!
//! ```text
//! <time>,DATA,<voltage>,<channel>
//! <time>,PAUSE
//! <time>,RESUME,<pauseDuration>
//! <time>,SAVE,<T|F>
//! <time>,END,<summary text>
//! ```

mod event;
mod reader;
mod writer;

pub use event::LogEvent;
pub use reader::{parse_log, read_log};
pub use writer::EventLogWriter;
