pub mod coord;
pub mod codec;
pub mod squashed;
pub mod anvil;
pub mod world;
pub mod store;
pub mod palette;
pub mod scanner;
pub mod extract;
pub mod squash;
pub mod validate;

pub use coord::{BlockBox, ChunkPos, RegionPos};
pub use squashed::{SquashedReader, SquashedWriter};
pub use anvil::{Chunk, RegionFile};
pub use world::{Dimension, World};
pub use store::{open_store, ChunkSource};
pub use palette::{PaletteTable, VoxelStream};
pub use scanner::{Accumulator, RegionScanner, TaskError};
pub use extract::{extract, extract_world, ExtractResponse, Extraction};
pub use squash::{squash_server, squash_world, SquashOptions, SquashOutcome};
pub use validate::{validate, CompletenessIndex, ValidateOptions};
