// session de montage : superbloc, FAT, racine et fichiers ouverts

use alloc::vec;
use core::fmt;
use log::{debug, warn};

use crate::directory::Entries;
use crate::open_files::Handle;
use crate::{
    AllocationTable, BlockDevice, Fd, FsError, OpenFileTable, Result, RootDirectory, Superblock,
    BLOCK_SIZE, MAX_FILES, MAX_OPEN,
};

/// État d'un volume monté
pub(crate) struct Volume<D: BlockDevice> {
    pub(crate) device: D,
    pub(crate) superblock: Superblock,
    pub(crate) fat: AllocationTable,
    pub(crate) root: RootDirectory,
    pub(crate) files: OpenFileTable,
}

impl<D: BlockDevice> Volume<D> {
    fn load(device: &mut D) -> Result<(Superblock, AllocationTable, RootDirectory)> {
        let mut block = [0u8; BLOCK_SIZE];
        device.read_block(0, &mut block)?;
        let superblock = Superblock::from_bytes(&block);
        superblock.validate(device.block_count())?;

        let fat = AllocationTable::load(device, &superblock)?;
        let root = RootDirectory::load(device, &superblock)?;
        Ok((superblock, fat, root))
    }

    fn flush(&mut self) -> Result<()> {
        self.device.write_block(0, &self.superblock.to_bytes())?;
        self.fat.store(&mut self.device, &self.superblock)?;
        self.root.store(&mut self.device, &self.superblock)
    }

    /// Descripteur ouvert dont l'emplacement porte toujours le même nom
    pub(crate) fn handle(&self, fd: Fd) -> Result<Handle> {
        let handle = *self.files.get(fd)?;
        let entry = self.root.entry(handle.slot);
        if entry.is_free() || entry.name_bytes() != &handle.name {
            warn!("descripteur {} pointe sur un emplacement modifié", fd);
            return Err(FsError::NotOpen);
        }
        Ok(handle)
    }
}

/// Statistiques renvoyées par `FileSystem::info`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub total_blocks: usize,
    pub fat_blocks: usize,
    pub root_index: usize,
    pub data_index: usize,
    pub data_blocks: usize,
    pub fat_free: usize,
    pub dir_free: usize,
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "FS Info:")?;
        writeln!(f, "total_blk_count={}", self.total_blocks)?;
        writeln!(f, "fat_blk_count={}", self.fat_blocks)?;
        writeln!(f, "rdir_blk={}", self.root_index)?;
        writeln!(f, "data_blk={}", self.data_index)?;
        writeln!(f, "data_blk_count={}", self.data_blocks)?;
        writeln!(f, "fat_free_ratio={}/{}", self.fat_free, self.data_blocks)?;
        write!(f, "rdir_free_ratio={}/{}", self.dir_free, MAX_FILES)
    }
}

/// Système de fichiers : démonté à la création, monté par `mount`.
///
/// Toutes les opérations autres que `mount` échouent avec `NotMounted`
/// tant qu'aucun volume n'est monté.
pub struct FileSystem<D: BlockDevice> {
    volume: Option<Volume<D>>,
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn new() -> Self {
        Self { volume: None }
    }

    pub fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    fn volume(&self) -> Result<&Volume<D>> {
        self.volume.as_ref().ok_or(FsError::NotMounted)
    }

    fn volume_mut(&mut self) -> Result<&mut Volume<D>> {
        self.volume.as_mut().ok_or(FsError::NotMounted)
    }

    /// Monter le volume présent sur `device`.
    ///
    /// En cas d'échec le périphérique est fermé et la session reste démontée.
    pub fn mount(&mut self, mut device: D) -> Result<()> {
        if self.volume.is_some() {
            return Err(FsError::Busy);
        }

        let (superblock, fat, root) = match Volume::load(&mut device) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("montage impossible: {}", e);
                let _ = device.close();
                return Err(e);
            }
        };

        debug!(
            "volume monté: {} blocs, {} blocs de données, {} libres",
            superblock.total_blocks,
            superblock.data_blocks,
            fat.free_count()
        );
        self.volume = Some(Volume {
            device,
            superblock,
            fat,
            root,
            files: OpenFileTable::new(MAX_OPEN),
        });
        Ok(())
    }

    /// Écrire superbloc, FAT et racine, fermer le périphérique et le rendre.
    ///
    /// Refusé avec `Busy` tant que des fichiers sont ouverts.
    pub fn unmount(&mut self) -> Result<D> {
        match &self.volume {
            None => return Err(FsError::NotMounted),
            Some(volume) if !volume.files.is_empty() => return Err(FsError::Busy),
            Some(_) => {}
        }
        let Some(mut volume) = self.volume.take() else {
            return Err(FsError::NotMounted);
        };

        if let Err(e) = volume.flush() {
            warn!("écriture du volume impossible au démontage: {}", e);
            let _ = volume.device.close();
            return Err(e);
        }
        volume.device.close()?;
        debug!("volume démonté");
        Ok(volume.device)
    }

    pub fn info(&self) -> Result<VolumeInfo> {
        let volume = self.volume()?;
        let sb = &volume.superblock;
        Ok(VolumeInfo {
            total_blocks: sb.total_blocks as usize,
            fat_blocks: sb.fat_blocks as usize,
            root_index: sb.root_index as usize,
            data_index: sb.data_index as usize,
            data_blocks: sb.data_blocks as usize,
            fat_free: volume.fat.free_count(),
            dir_free: volume.root.free_count(),
        })
    }

    pub fn create(&mut self, name: &str) -> Result<()> {
        let volume = self.volume_mut()?;
        let slot = volume.root.create(name)?;
        debug!("fichier '{}' créé (emplacement {})", name, slot);
        Ok(())
    }

    /// Supprimer un fichier et libérer ses blocs
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let volume = self.volume_mut()?;
        let slot = volume.root.find(name)?;
        if volume.files.is_referenced(slot) {
            return Err(FsError::Busy);
        }
        let head = volume.root.entry(slot).head();
        volume.fat.free_chain(head)?;
        volume.root.clear(slot);
        debug!("fichier '{}' supprimé", name);
        Ok(())
    }

    /// Index de l'emplacement du fichier `name`
    pub fn find(&self, name: &str) -> Result<usize> {
        self.volume()?.root.find(name)
    }

    /// Fichiers du répertoire racine, dans l'ordre des emplacements
    pub fn list(&self) -> Result<Entries<'_>> {
        Ok(self.volume()?.root.iter())
    }

    pub fn open(&mut self, name: &str) -> Result<Fd> {
        let volume = self.volume_mut()?;
        let slot = volume.root.find(name)?;
        let fd = volume.files.open(slot, *volume.root.entry(slot).name_bytes())?;
        debug!("'{}' ouvert: fd {}", name, fd);
        Ok(fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.volume_mut()?.files.close(fd)?;
        debug!("fd {} fermé", fd);
        Ok(())
    }

    /// Taille actuelle du fichier, y compris les écritures faites par d'autres descripteurs
    pub fn stat(&self, fd: Fd) -> Result<usize> {
        let volume = self.volume()?;
        let handle = volume.handle(fd)?;
        Ok(volume.root.entry(handle.slot).size() as usize)
    }

    /// Placer la position ; `offset` égal à la taille désigne la fin du fichier
    pub fn seek(&mut self, fd: Fd, offset: usize) -> Result<()> {
        let volume = self.volume_mut()?;
        let handle = volume.handle(fd)?;
        if offset > volume.root.entry(handle.slot).size() as usize {
            return Err(FsError::OutOfRange);
        }
        volume.files.get_mut(fd)?.offset = offset;
        Ok(())
    }

    /// Position courante du descripteur
    pub fn offset(&self, fd: Fd) -> Result<usize> {
        Ok(self.volume()?.handle(fd)?.offset)
    }

    /// Lire au plus `buf.len()` octets à la position courante
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        self.volume_mut()?.read(fd, buf)
    }

    /// Écrire `data` à la position courante, en agrandissant le fichier au besoin.
    ///
    /// Renvoie moins que `data.len()` si le volume est plein.
    pub fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize> {
        self.volume_mut()?.write(fd, data)
    }

    /// Vérifier que chaque bloc de données est libre ou appartient à un seul fichier
    pub fn check(&self) -> Result<()> {
        let volume = self.volume()?;
        let fat = &volume.fat;
        let mut owned = vec![false; fat.data_blocks()];
        owned[0] = true;

        for (_, entry) in volume.root.used() {
            let mut len = 0;
            for block in fat.chain(entry.head()) {
                let block = block? as usize;
                if owned[block] {
                    warn!("bloc {} partagé ('{}')", block, entry.name());
                    return Err(FsError::Corrupted);
                }
                owned[block] = true;
                len += 1;
            }
            if len != (entry.size() as usize).div_ceil(BLOCK_SIZE) {
                warn!("longueur de chaîne incohérente pour '{}'", entry.name());
                return Err(FsError::Corrupted);
            }
        }

        if let Some(leaked) = (1..fat.data_blocks()).find(|&i| !owned[i] && !fat.is_free(i as u16)) {
            warn!("bloc {} alloué mais sans fichier", leaked);
            return Err(FsError::Corrupted);
        }

        volume.root.check_names()
    }
}

impl<D: BlockDevice> Default for FileSystem<D> {
    fn default() -> Self {
        Self::new()
    }
}
