//! Création d'un volume vide

use log::{debug, warn};

use crate::{
    AllocationTable, BlockDevice, FsError, Result, RootDirectory, Superblock, MAX_DATA_BLOCKS,
};

/// Écrire un volume vide de `data_blocks` blocs de données sur `device`.
///
/// Le périphérique doit contenir au moins `data_blocks + blocs FAT + 2` blocs ;
/// les blocs de données ne sont pas effacés.
pub fn format_volume<D: BlockDevice>(device: &mut D, data_blocks: u16) -> Result<Superblock> {
    if data_blocks == 0 || data_blocks as usize > MAX_DATA_BLOCKS {
        warn!("nombre de blocs de données invalide: {}", data_blocks);
        return Err(FsError::InvalidVolume);
    }

    let sb = Superblock::new(data_blocks);
    if device.block_count() < sb.total_blocks as usize {
        warn!(
            "périphérique trop petit: {} blocs, {} nécessaires",
            device.block_count(),
            sb.total_blocks
        );
        return Err(FsError::InvalidVolume);
    }

    device.write_block(0, &sb.to_bytes())?;
    AllocationTable::new(data_blocks as usize).store(device, &sb)?;
    RootDirectory::new().store(device, &sb)?;

    debug!(
        "volume formaté: {} blocs dont {} de FAT",
        sb.total_blocks, sb.fat_blocks
    );
    Ok(sb)
}
