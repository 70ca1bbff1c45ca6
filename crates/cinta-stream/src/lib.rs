//! Realtime disk streaming for the Cinta soundfile workspace.
//!
//! Two objects bridge blocking disk I/O to a realtime audio callback
//! through a bounded byte FIFO served by a dedicated worker thread:
//!
//! - [`StreamReader`] plays a soundfile: the worker fills the FIFO from
//!   disk, the audio callback decodes frames out of it
//! - [`StreamWriter`] records one: the audio callback encodes frames into
//!   the FIFO, the worker drains it to disk and fixes up the header on
//!   close
//!
//! Both follow the same discipline: one mutex guards every shared field
//! (including the FIFO bytes), two condition variables carry "there is
//! work" and "there is progress", and the disk is only ever touched with
//! the mutex released. The callback may block briefly when the FIFO is
//! starved (reader) or full (writer); everything else is wait-free for the
//! audio thread.
//!
//! ```rust,ignore
//! use cinta_stream::{OpenRequest, StreamReader};
//!
//! let reader = StreamReader::new(2, 0, resolver)?;
//! reader.open(OpenRequest::new("loop.wav"));
//! reader.start();
//! // audio callback:
//! reader.process(&mut [&mut left, &mut right]);
//! ```

mod shared;

pub mod reader;
pub mod writer;

pub use reader::{OpenRequest, StreamReader};
pub use shared::{
    DEF_BUF_PER_CHANNEL, MAX_BUFSIZE, MAX_VECSIZE, MIN_BUFSIZE, READSIZE, Request, StreamPhase,
    WRITESIZE,
};
pub use writer::StreamWriter;
