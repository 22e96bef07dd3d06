//! Gestion du répertoire racine

use alloc::string::String;
use core::fmt;
use log::warn;

use crate::{Block, BlockDevice, FsError, Result, Superblock, BLOCK_SIZE, FAT_EOC, FILENAME_LEN, MAX_FILES};

/// Entrée de répertoire (32 octets)
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; FILENAME_LEN],
    size: u32,
    head: u16,
}

impl DirEntry {
    pub const SIZE: usize = 32;

    /// Emplacement libre
    pub const EMPTY: Self = Self {
        name: [0; FILENAME_LEN],
        size: 0,
        head: FAT_EOC,
    };

    /// Lire une entrée depuis des données brutes (au moins 32 octets)
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut name = [0u8; FILENAME_LEN];
        name.copy_from_slice(&data[0..16]);
        Self {
            name,
            size: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            head: u16::from_le_bytes([data[20], data[21]]),
        }
    }

    /// Octets 22..32 : padding à zéro
    pub fn write_bytes(&self, out: &mut [u8]) {
        out[0..16].copy_from_slice(&self.name);
        out[16..20].copy_from_slice(&self.size.to_le_bytes());
        out[20..22].copy_from_slice(&self.head.to_le_bytes());
        out[22..Self::SIZE].fill(0);
    }

    /// Un premier octet nul marque l'emplacement comme libre
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    pub fn name_bytes(&self) -> &[u8; FILENAME_LEN] {
        &self.name
    }

    /// Octets du nom, sans le bourrage NUL
    pub fn name_trimmed(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(FILENAME_LEN);
        &self.name[..len]
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(self.name_trimmed()).unwrap_or("")
    }

    /// Taille du fichier en octets
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    /// Premier bloc de données, `FAT_EOC` pour un fichier vide
    pub fn head(&self) -> u16 {
        self.head
    }

    pub fn set_head(&mut self, head: u16) {
        self.head = head;
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("name", &String::from_utf8_lossy(self.name_trimmed()))
            .field("size", &self.size)
            .field("head", &self.head)
            .finish()
    }
}

/// Convertir un nom en champ de 16 octets terminé par NUL
pub fn encode_name(name: &str) -> Result<[u8; FILENAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.contains(&0) {
        return Err(FsError::InvalidName);
    }
    if bytes.len() >= FILENAME_LEN {
        return Err(FsError::NameTooLong);
    }
    let mut out = [0u8; FILENAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Fichier tel que listé par `RootDirectory::iter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub size: u32,
    pub head: u16,
}

/// Le répertoire racine : tableau fixe de `MAX_FILES` entrées tenant dans un bloc
pub struct RootDirectory {
    entries: [DirEntry; MAX_FILES],
}

impl RootDirectory {
    pub fn new() -> Self {
        Self {
            entries: [DirEntry::EMPTY; MAX_FILES],
        }
    }

    pub fn from_block(block: &Block) -> Self {
        let mut dir = Self::new();
        for (entry, raw) in dir.entries.iter_mut().zip(block.chunks_exact(DirEntry::SIZE)) {
            *entry = DirEntry::from_bytes(raw);
        }
        dir
    }

    pub fn to_block(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        for (entry, raw) in self.entries.iter().zip(block.chunks_exact_mut(DirEntry::SIZE)) {
            entry.write_bytes(raw);
        }
        block
    }

    pub fn load<D: BlockDevice>(device: &mut D, sb: &Superblock) -> Result<Self> {
        let mut block = [0u8; BLOCK_SIZE];
        device.read_block(sb.root_index as usize, &mut block)?;
        Ok(Self::from_block(&block))
    }

    pub fn store<D: BlockDevice>(&self, device: &mut D, sb: &Superblock) -> Result<()> {
        device.write_block(sb.root_index as usize, &self.to_block())
    }

    pub fn entry(&self, slot: usize) -> &DirEntry {
        &self.entries[slot]
    }

    pub fn entry_mut(&mut self, slot: usize) -> &mut DirEntry {
        &mut self.entries[slot]
    }

    /// Index de l'entrée portant ce nom
    pub fn find(&self, name: &str) -> Result<usize> {
        let key = encode_name(name).map_err(|_| FsError::NotFound)?;
        self.entries
            .iter()
            .position(|e| !e.is_free() && e.name == key)
            .ok_or(FsError::NotFound)
    }

    /// Créer un fichier vide dans le premier emplacement libre
    pub fn create(&mut self, name: &str) -> Result<usize> {
        let key = encode_name(name)?;
        if self.entries.iter().any(|e| !e.is_free() && e.name == key) {
            return Err(FsError::AlreadyExists);
        }
        let slot = self
            .entries
            .iter()
            .position(DirEntry::is_free)
            .ok_or(FsError::DirectoryFull)?;
        self.entries[slot] = DirEntry {
            name: key,
            size: 0,
            head: FAT_EOC,
        };
        Ok(slot)
    }

    /// Vider un emplacement et rendre l'ancienne entrée
    pub fn clear(&mut self, slot: usize) -> DirEntry {
        core::mem::replace(&mut self.entries[slot], DirEntry::EMPTY)
    }

    /// Emplacements libres (nom vide ; un fichier vide nommé compte comme occupé)
    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_free()).count()
    }

    /// Fichiers présents, dans l'ordre des emplacements
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            inner: self.entries.iter(),
        }
    }

    /// Index et entrée de chaque fichier présent
    pub fn used(&self) -> impl Iterator<Item = (usize, &DirEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| !e.is_free())
    }

    /// Signaler les noms dupliqués hérités d'une image mal formée
    pub fn check_names(&self) -> Result<()> {
        for (i, (_, a)) in self.used().enumerate() {
            if self.used().skip(i + 1).any(|(_, b)| b.name == a.name) {
                warn!("nom dupliqué dans le répertoire: {}", String::from_utf8_lossy(a.name_trimmed()));
                return Err(FsError::Corrupted);
            }
        }
        Ok(())
    }
}

impl Default for RootDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Itérateur paresseux sur les fichiers du répertoire racine
pub struct Entries<'a> {
    inner: core::slice::Iter<'a, DirEntry>,
}

impl Iterator for Entries<'_> {
    type Item = DirEntryInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.find(|e| !e.is_free()).map(|e| DirEntryInfo {
            // une image étrangère peut contenir des noms non UTF-8
            name: String::from_utf8_lossy(e.name_trimmed()).into_owned(),
            size: e.size,
            head: e.head,
        })
    }
}
