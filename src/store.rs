//! Model persistence: one compressed, versioned artifact holding the
//! weights, both frozen vocabularies, the feature configuration and the
//! lexicon contents. The artifact is self-describing; loading anything
//! incompatible fails with [`Error::InvalidModel`] instead of producing a
//! half-restored model.

use std::io::{Read, Write};

use crate::model::TrainedModel;
use crate::Error;

/// File magic; bumping [`VERSION`] invalidates older artifacts.
const MAGIC: &[u8; 4] = b"bTAG";
const VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;

pub(crate) fn write<W: Write>(model: &TrainedModel, mut wtr: W) -> Result<(), Error> {
    let doc = bson::to_vec(model)?;
    let compressed = zstd::stream::encode_all(doc.as_slice(), ZSTD_LEVEL)?;
    wtr.write_all(MAGIC)?;
    wtr.write_all(&VERSION.to_le_bytes())?;
    wtr.write_all(&compressed)?;
    Ok(())
}

pub(crate) fn read<R: Read>(mut rdr: R) -> Result<TrainedModel, Error> {
    let mut header = [0u8; 8];
    rdr.read_exact(&mut header)
        .map_err(|_| Error::InvalidModel("artifact too short for a header".to_string()))?;
    if &header[..4] != MAGIC {
        return Err(Error::InvalidModel("bad magic".to_string()));
    }
    let version = u32::from_le_bytes(header[4..8].try_into().unwrap());
    if version != VERSION {
        return Err(Error::InvalidModel(format!(
            "unsupported model version {version}, expected {VERSION}"
        )));
    }
    let doc = zstd::stream::decode_all(rdr)
        .map_err(|e| Error::InvalidModel(format!("decompression failed: {e}")))?;
    let mut model: TrainedModel = bson::from_slice(&doc)
        .map_err(|e| Error::InvalidModel(format!("malformed model document: {e}")))?;
    model.finalize();
    Ok(model)
}
