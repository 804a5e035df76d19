pub mod discovery;
pub mod merger;
pub mod planner;
pub mod reader;
pub mod sequencer;
pub mod writer;

pub use discovery::{discover_comics, natural_sort, DiscoveryOptions};
pub use merger::ComicMerger;
pub use planner::ChunkPlanner;
pub use reader::ArchiveReader;
pub use sequencer::{PageSequencer, SequencedStream};
pub use writer::ArchiveWriter;
