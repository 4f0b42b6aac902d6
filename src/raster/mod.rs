//! The "id reference image": an offscreen raster where every tracked line
//! is drawn under an encoded 32-bit id, later box-searched to classify
//! visibility and to find correspondence candidates.

pub mod encoding;
mod idbuffer;
mod io;

pub use encoding::IdAllocator;
pub use idbuffer::IdBuffer;
pub use io::{save_id_raster, write_json_file};
