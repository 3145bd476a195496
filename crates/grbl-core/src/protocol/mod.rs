//! GRBL line protocol: status reports, responses, commands, and line framing.

pub mod command;
pub mod line;
pub mod response;
pub mod status;

pub use command::{air_assist_change, is_stream_trigger, terminate_line, NOT_CONNECTED_NOTICE};
pub use line::LineBuffer;
pub use response::{classify_response, Response};
pub use status::{parse_status_report, FeedSpeed, StatusError, StatusReport};
