#![no_std]
extern crate alloc;

pub mod error;
pub mod superblock;
pub mod fat_table;
pub mod directory;
pub mod open_files;
pub mod filesystem;
mod file_io;
pub mod format;

pub use error::{FsError, Result};
pub use superblock::Superblock;
pub use fat_table::AllocationTable;
pub use directory::{DirEntry, DirEntryInfo, RootDirectory};
pub use open_files::{Fd, OpenFileTable};
pub use filesystem::{FileSystem, VolumeInfo};
pub use format::format_volume;

/// Taille d'un bloc en octets
pub const BLOCK_SIZE: usize = 4096;
/// Signature du superbloc (bloc 0)
pub const SIGNATURE: [u8; 8] = *b"ECS150FS";
/// Entrée FAT libre
pub const FAT_FREE: u16 = 0;
/// Fin de chaîne, aussi utilisée comme tête d'un fichier vide
pub const FAT_EOC: u16 = 0xFFFF;
/// Nombre d'entrées du répertoire racine
pub const MAX_FILES: usize = 128;
/// Longueur du champ nom, octet NUL compris
pub const FILENAME_LEN: usize = 16;
/// Nombre maximal de fichiers ouverts en même temps
pub const MAX_OPEN: usize = 32;
/// Nombre maximal de blocs de données d'un volume
pub const MAX_DATA_BLOCKS: usize = 8192;

pub type Block = [u8; BLOCK_SIZE];

/// Périphérique bloc sous-jacent.
///
/// La taille de bloc est fixe (`BLOCK_SIZE`) et chaque écriture de bloc est
/// supposée atomique.
pub trait BlockDevice {
    fn read_block(&mut self, index: usize, buffer: &mut Block) -> Result<()>;
    fn write_block(&mut self, index: usize, buffer: &Block) -> Result<()>;
    fn block_count(&self) -> usize;

    /// Appelé au démontage, après le dernier flush.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
