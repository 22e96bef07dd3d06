use log::warn;

use crate::{Block, FsError, Result, BLOCK_SIZE, FAT_EOC, SIGNATURE};
use crate::fat_table::ENTRIES_PER_BLOCK;

// superbloc du volume (bloc 0)

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superblock {
    pub signature: [u8; 8],
    pub total_blocks: u16,
    pub root_index: u16,
    pub data_index: u16,
    pub data_blocks: u16,
    pub fat_blocks: u8,
}

impl Superblock {
    /// Superbloc d'un volume neuf de `data_blocks` blocs de données
    pub fn new(data_blocks: u16) -> Self {
        let fat_blocks = (data_blocks as usize).div_ceil(ENTRIES_PER_BLOCK) as u8;
        let root_index = fat_blocks as u16 + 1;
        Self {
            signature: SIGNATURE,
            total_blocks: data_blocks + fat_blocks as u16 + 2,
            root_index,
            data_index: root_index + 1,
            data_blocks,
            fat_blocks,
        }
    }

    // Octets 17..4096 : padding
    pub fn from_bytes(data: &Block) -> Self {
        let mut signature = [0u8; 8];
        signature.copy_from_slice(&data[0..8]);
        Self {
            signature,
            total_blocks: u16::from_le_bytes([data[8], data[9]]),
            root_index: u16::from_le_bytes([data[10], data[11]]),
            data_index: u16::from_le_bytes([data[12], data[13]]),
            data_blocks: u16::from_le_bytes([data[14], data[15]]),
            fat_blocks: data[16],
        }
    }

    pub fn to_bytes(&self) -> Block {
        let mut data = [0u8; BLOCK_SIZE];
        data[0..8].copy_from_slice(&self.signature);
        data[8..10].copy_from_slice(&self.total_blocks.to_le_bytes());
        data[10..12].copy_from_slice(&self.root_index.to_le_bytes());
        data[12..14].copy_from_slice(&self.data_index.to_le_bytes());
        data[14..16].copy_from_slice(&self.data_blocks.to_le_bytes());
        data[16] = self.fat_blocks;
        data
    }

    /// Vérifier que le superbloc décrit un volume cohérent avec le périphérique
    pub fn validate(&self, device_blocks: usize) -> Result<()> {
        if self.signature != SIGNATURE {
            warn!("signature de volume invalide");
            return Err(FsError::InvalidVolume);
        }

        if (self.total_blocks as usize) > device_blocks {
            warn!(
                "volume de {} blocs sur un périphérique de {} blocs",
                self.total_blocks, device_blocks
            );
            return Err(FsError::InvalidVolume);
        }

        // superbloc + FAT + racine + données
        let expected_data = (self.total_blocks as usize)
            .checked_sub(self.fat_blocks as usize + 2)
            .ok_or(FsError::InvalidVolume)?;
        if self.data_blocks as usize != expected_data
            || self.data_blocks == 0
            || self.data_blocks as usize >= FAT_EOC as usize
        {
            warn!("nombre de blocs de données incohérent: {}", self.data_blocks);
            return Err(FsError::InvalidVolume);
        }

        if self.fat_blocks as usize != (self.data_blocks as usize).div_ceil(ENTRIES_PER_BLOCK) {
            warn!("taille de FAT incohérente: {} blocs", self.fat_blocks);
            return Err(FsError::InvalidVolume);
        }

        if self.root_index != self.fat_blocks as u16 + 1 || self.data_index != self.root_index + 1 {
            warn!(
                "disposition invalide: racine {} données {}",
                self.root_index, self.data_index
            );
            return Err(FsError::InvalidVolume);
        }

        Ok(())
    }

    /// Premier bloc de la FAT
    pub fn first_fat_block(&self) -> usize {
        1
    }

    /// Bloc physique d'un bloc de données
    pub fn data_block(&self, index: u16) -> usize {
        self.data_index as usize + index as usize
    }
}
