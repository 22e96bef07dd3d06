// Tests d'intégration pour simplefs
use simplefs::{
    format_volume, Block, BlockDevice, FileSystem, FsError, Result, BLOCK_SIZE, FAT_EOC, MAX_FILES,
    MAX_OPEN,
};

/// Device de test
struct TestDevice {
    blocks: Vec<Block>,
    fail_reads: bool,
    fail_writes: bool,
    closed: bool,
}

impl TestDevice {
    fn new(count: usize) -> Self {
        Self {
            blocks: vec![[0u8; BLOCK_SIZE]; count],
            fail_reads: false,
            fail_writes: false,
            closed: false,
        }
    }

    fn formatted(data_blocks: u16) -> Self {
        let fat_blocks = (data_blocks as usize).div_ceil(BLOCK_SIZE / 2);
        let mut device = Self::new(data_blocks as usize + fat_blocks + 2);
        format_volume(&mut device, data_blocks).unwrap();
        device
    }
}

impl BlockDevice for TestDevice {
    fn read_block(&mut self, index: usize, buffer: &mut Block) -> Result<()> {
        if self.fail_reads {
            return Err(FsError::IoError);
        }
        let block = self.blocks.get(index).ok_or(FsError::IoError)?;
        buffer.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&mut self, index: usize, buffer: &Block) -> Result<()> {
        if self.fail_writes {
            return Err(FsError::IoError);
        }
        let block = self.blocks.get_mut(index).ok_or(FsError::IoError)?;
        block.copy_from_slice(buffer);
        Ok(())
    }

    fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn mount(data_blocks: u16) -> FileSystem<TestDevice> {
    let mut fs = FileSystem::new();
    fs.mount(TestDevice::formatted(data_blocks)).unwrap();
    fs
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8 ^ 0x5A).collect()
}

// blocs libres + blocs atteignables depuis le répertoire == blocs de données utilisables
fn assert_no_leak(fs: &FileSystem<TestDevice>) {
    let info = fs.info().unwrap();
    let used: usize = fs
        .list()
        .unwrap()
        .map(|e| (e.size as usize).div_ceil(BLOCK_SIZE))
        .sum();
    assert_eq!(info.fat_free + used, info.data_blocks - 1);
    fs.check().unwrap();
}

#[test]
fn test_mount_unmount() {
    let mut fs = mount(16);
    assert!(fs.is_mounted());
    let device = fs.unmount().unwrap();
    assert!(device.closed);
    assert!(!fs.is_mounted());
}

#[test]
fn test_invalid_volume() {
    let mut fs = FileSystem::new();
    let device = TestDevice::new(32);
    assert_eq!(fs.mount(device), Err(FsError::InvalidVolume));
    assert!(!fs.is_mounted());
}

#[test]
fn test_mount_io_error() {
    let mut device = TestDevice::formatted(16);
    device.fail_reads = true;
    let mut fs = FileSystem::new();
    assert_eq!(fs.mount(device), Err(FsError::IoError));
    assert_eq!(fs.info(), Err(FsError::NotMounted));
}

#[test]
fn test_not_mounted() {
    let mut fs: FileSystem<TestDevice> = FileSystem::new();
    assert_eq!(fs.create("a"), Err(FsError::NotMounted));
    assert_eq!(fs.open("a"), Err(FsError::NotMounted));
    assert_eq!(fs.stat(0), Err(FsError::NotMounted));
    assert!(fs.list().is_err());
    assert!(fs.unmount().is_err());
}

#[test]
fn test_double_mount() {
    let mut fs = mount(16);
    assert_eq!(fs.mount(TestDevice::formatted(16)), Err(FsError::Busy));
    assert!(fs.is_mounted());
}

#[test]
fn test_unmount_busy() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let fd = fs.open("a").unwrap();
    assert!(matches!(fs.unmount(), Err(FsError::Busy)));
    // toujours monté
    assert_eq!(fs.stat(fd), Ok(0));
    fs.close(fd).unwrap();
    assert!(fs.unmount().is_ok());
}

#[test]
fn test_unmount_io_error() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let mut device = fs.unmount().unwrap();
    device.fail_writes = true;
    fs.mount(device).unwrap();
    assert!(matches!(fs.unmount(), Err(FsError::IoError)));
    assert!(!fs.is_mounted());
}

#[test]
fn test_info() {
    let mut fs = mount(8192);
    fs.create("empty").unwrap();
    let info = fs.info().unwrap();
    assert_eq!(info.total_blocks, 8198);
    assert_eq!(info.fat_blocks, 4);
    assert_eq!(info.root_index, 5);
    assert_eq!(info.data_index, 6);
    assert_eq!(info.data_blocks, 8192);
    assert_eq!(info.fat_free, 8191);
    // un fichier vide occupe quand même son emplacement
    assert_eq!(info.dir_free, MAX_FILES - 1);

    let text = info.to_string();
    assert!(text.starts_with("FS Info:\n"));
    assert!(text.contains("fat_free_ratio=8191/8192"));
    assert!(text.ends_with("rdir_free_ratio=127/128"));
}

#[test]
fn test_hello_world_scenario() {
    let mut fs = mount(8192);
    fs.create("a.txt").unwrap();
    let fd = fs.open("a.txt").unwrap();
    assert_eq!(fd, 0);
    assert_eq!(fs.write(fd, b"hello world"), Ok(11));
    assert_eq!(fs.stat(fd), Ok(11));
    fs.seek(fd, 0).unwrap();

    let mut buf = [0u8; 11];
    assert_eq!(fs.read(fd, &mut buf), Ok(11));
    assert_eq!(&buf, b"hello world");

    fs.close(fd).unwrap();
    assert_eq!(fs.delete("a.txt"), Ok(()));
    assert_eq!(fs.find("a.txt"), Err(FsError::NotFound));
    assert_eq!(fs.info().unwrap().fat_free, 8191);
}

#[test]
fn test_write_spanning_two_blocks() {
    let mut fs = mount(8192);
    fs.create("big").unwrap();
    let fd = fs.open("big").unwrap();
    let data = pattern(5000);
    assert_eq!(fs.write(fd, &data), Ok(5000));
    assert_eq!(fs.stat(fd), Ok(5000));
    assert_eq!(fs.info().unwrap().fat_free, 8191 - 2);

    fs.seek(fd, 0).unwrap();
    let mut out = vec![0u8; 5000];
    assert_eq!(fs.read(fd, &mut out), Ok(5000));
    assert_eq!(out, data);
    fs.close(fd).unwrap();
    assert_no_leak(&fs);
}

#[test]
fn test_create_then_open() {
    let mut fs = mount(16);
    for name in ["a", "file.txt", "0123456789abcde"] {
        fs.create(name).unwrap();
        assert!(fs.find(name).is_ok());
        let fd = fs.open(name).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.create(name), Err(FsError::AlreadyExists));
    }
}

#[test]
fn test_create_errors() {
    let mut fs = mount(16);
    assert_eq!(fs.create("0123456789abcdef"), Err(FsError::NameTooLong));
    assert_eq!(fs.create(""), Err(FsError::InvalidName));
    for i in 0..MAX_FILES {
        fs.create(&format!("f{}", i)).unwrap();
    }
    assert_eq!(fs.create("extra"), Err(FsError::DirectoryFull));
}

#[test]
fn test_delete_nonexistent() {
    let mut fs = mount(16);
    fs.create("keep").unwrap();
    let before: Vec<_> = fs.list().unwrap().collect();
    assert_eq!(fs.delete("missing"), Err(FsError::NotFound));
    assert_eq!(fs.delete("missing"), Err(FsError::NotFound));
    let after: Vec<_> = fs.list().unwrap().collect();
    assert_eq!(before, after);
}

#[test]
fn test_delete_open_file() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let fd = fs.open("a").unwrap();
    fs.write(fd, &pattern(3 * BLOCK_SIZE)).unwrap();
    assert_eq!(fs.delete("a"), Err(FsError::Busy));
    fs.close(fd).unwrap();

    let free_before = fs.info().unwrap().fat_free;
    fs.delete("a").unwrap();
    assert_eq!(fs.info().unwrap().fat_free, free_before + 3);
    assert_no_leak(&fs);
}

#[test]
fn test_list() {
    let mut fs = mount(16);
    fs.create("one").unwrap();
    fs.create("two").unwrap();
    fs.create("three").unwrap();
    fs.delete("two").unwrap();
    let fd = fs.open("three").unwrap();
    fs.write(fd, b"abc").unwrap();
    fs.close(fd).unwrap();

    let entries: Vec<_> = fs.list().unwrap().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "one");
    assert_eq!(entries[0].size, 0);
    assert_eq!(entries[0].head, FAT_EOC);
    assert_eq!(entries[1].name, "three");
    assert_eq!(entries[1].size, 3);
    assert_ne!(entries[1].head, FAT_EOC);
}

#[test]
fn test_open_errors() {
    let mut fs = mount(16);
    assert_eq!(fs.open("nope"), Err(FsError::NotFound));
    fs.create("a").unwrap();
    for _ in 0..MAX_OPEN {
        fs.open("a").unwrap();
    }
    assert_eq!(fs.open("a"), Err(FsError::TooManyOpen));
}

#[test]
fn test_close_and_descriptor_ids() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let i = fs.open("a").unwrap();
    let j = fs.open("a").unwrap();
    assert_eq!((i, j), (0, 1));
    fs.close(i).unwrap();
    assert_eq!(fs.close(i), Err(FsError::NotOpen));
    assert_eq!(fs.stat(i), Err(FsError::NotOpen));
    // jamais réutilisé
    assert_eq!(fs.open("a"), Ok(2));
}

#[test]
fn test_seek() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let fd = fs.open("a").unwrap();
    fs.write(fd, b"0123456789").unwrap();
    assert_eq!(fs.seek(fd, 11), Err(FsError::OutOfRange));
    assert_eq!(fs.seek(fd, 10), Ok(()));
    assert_eq!(fs.offset(fd), Ok(10));
    fs.seek(fd, 4).unwrap();
    let mut buf = [0u8; 3];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"456");
    assert_eq!(fs.offset(fd), Ok(7));
}

#[test]
fn test_handles_share_file_size() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let writer = fs.open("a").unwrap();
    let reader = fs.open("a").unwrap();
    fs.write(writer, b"shared data").unwrap();
    // la taille n'est pas mise en cache par descripteur
    assert_eq!(fs.stat(reader), Ok(11));
    assert_eq!(fs.offset(reader), Ok(0));

    let mut buf = [0u8; 6];
    assert_eq!(fs.read(reader, &mut buf), Ok(6));
    assert_eq!(&buf, b"shared");
}

#[test]
fn test_roundtrip_various_sizes() {
    let mut fs = mount(64);
    for (i, len) in [1, 100, BLOCK_SIZE - 1, BLOCK_SIZE, BLOCK_SIZE + 1, 3 * BLOCK_SIZE + 17]
        .into_iter()
        .enumerate()
    {
        let name = format!("f{}", i);
        let data = pattern(len);
        fs.create(&name).unwrap();
        let fd = fs.open(&name).unwrap();
        assert_eq!(fs.write(fd, &data), Ok(len));
        fs.seek(fd, 0).unwrap();
        let mut out = vec![0u8; len];
        assert_eq!(fs.read(fd, &mut out), Ok(len));
        assert_eq!(out, data);
        fs.close(fd).unwrap();
    }
    assert_no_leak(&fs);
}

#[test]
fn test_write_no_space() {
    let mut fs = mount(5);
    fs.create("a").unwrap();
    fs.create("b").unwrap();
    let a = fs.open("a").unwrap();
    fs.write(a, &pattern(2 * BLOCK_SIZE)).unwrap();

    let b = fs.open("b").unwrap();
    let data = pattern(4 * BLOCK_SIZE);
    let written = fs.write(b, &data).unwrap();
    assert_eq!(written, 2 * BLOCK_SIZE);
    assert_eq!(fs.stat(b), Ok(written));
    assert_eq!(fs.info().unwrap().fat_free, 0);

    // les octets déjà écrits sont intacts
    fs.seek(b, 0).unwrap();
    let mut out = vec![0u8; written];
    fs.read(b, &mut out).unwrap();
    assert_eq!(out, &data[..written]);

    fs.close(a).unwrap();
    fs.close(b).unwrap();
    assert_no_leak(&fs);
}

#[test]
fn test_persistence_across_mounts() {
    let mut fs = mount(32);
    fs.create("keep.bin").unwrap();
    let fd = fs.open("keep.bin").unwrap();
    let data = pattern(2 * BLOCK_SIZE + 123);
    fs.write(fd, &data).unwrap();
    fs.close(fd).unwrap();
    let device = fs.unmount().unwrap();

    let mut fs = FileSystem::new();
    fs.mount(device).unwrap();
    let fd = fs.open("keep.bin").unwrap();
    assert_eq!(fs.stat(fd), Ok(data.len()));
    let mut out = vec![0u8; data.len()];
    assert_eq!(fs.read(fd, &mut out), Ok(data.len()));
    assert_eq!(out, data);
    fs.close(fd).unwrap();
    assert_no_leak(&fs);
}

#[test]
fn test_interleaved_files_do_not_share_blocks() {
    let mut fs = mount(32);
    fs.create("a").unwrap();
    fs.create("b").unwrap();
    let a = fs.open("a").unwrap();
    let b = fs.open("b").unwrap();
    let da = pattern(3 * BLOCK_SIZE);
    let db: Vec<u8> = pattern(3 * BLOCK_SIZE).iter().map(|x| !x).collect();

    // écritures alternées, chaînes entrelacées
    for k in 0..3 {
        let range = k * BLOCK_SIZE..(k + 1) * BLOCK_SIZE;
        fs.write(a, &da[range.clone()]).unwrap();
        fs.write(b, &db[range]).unwrap();
    }
    fs.check().unwrap();

    fs.seek(a, 0).unwrap();
    let mut out = vec![0u8; da.len()];
    fs.read(a, &mut out).unwrap();
    assert_eq!(out, da);
    fs.seek(b, 0).unwrap();
    fs.read(b, &mut out).unwrap();
    assert_eq!(out, db);
}

#[test]
fn test_corrupted_fat_is_detected() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let fd = fs.open("a").unwrap();
    fs.write(fd, &pattern(2 * BLOCK_SIZE)).unwrap();
    fs.close(fd).unwrap();
    let mut device = fs.unmount().unwrap();

    // boucle: bloc 2 -> bloc 1
    device.blocks[1][4..6].copy_from_slice(&1u16.to_le_bytes());
    let mut fs = FileSystem::new();
    fs.mount(device).unwrap();
    assert_eq!(fs.check(), Err(FsError::Corrupted));
}

#[test]
fn test_failed_write_releases_new_block() {
    let mut fs = mount(8);
    fs.create("f").unwrap();
    fs.create("g").unwrap();
    let fd = fs.open("f").unwrap();
    fs.write(fd, b"x").unwrap();
    fs.close(fd).unwrap();
    let fd = fs.open("g").unwrap();
    fs.write(fd, &pattern(BLOCK_SIZE)).unwrap();
    fs.close(fd).unwrap();
    let mut device = fs.unmount().unwrap();

    // le montage ne fait que lire
    device.fail_writes = true;
    let mut fs = FileSystem::new();
    fs.mount(device).unwrap();
    let free_before = fs.info().unwrap().fat_free;

    // fichier vide : le bloc alloué était la tête
    fs.delete("f").unwrap();
    fs.create("f").unwrap();
    let free_before = free_before + 1;
    let fd = fs.open("f").unwrap();
    assert_eq!(fs.write(fd, b"hello"), Err(FsError::IoError));
    assert_eq!(fs.stat(fd), Ok(0));
    assert_eq!(fs.offset(fd), Ok(0));
    fs.close(fd).unwrap();

    // fin de fichier alignée : le bloc alloué était en queue
    let fd = fs.open("g").unwrap();
    fs.seek(fd, BLOCK_SIZE).unwrap();
    assert_eq!(fs.write(fd, b"more"), Err(FsError::IoError));
    assert_eq!(fs.stat(fd), Ok(BLOCK_SIZE));
    fs.close(fd).unwrap();

    assert_eq!(fs.info().unwrap().fat_free, free_before);
    let entries: Vec<_> = fs.list().unwrap().collect();
    let f = entries.iter().find(|e| e.name == "f").unwrap();
    assert_eq!(f.head, FAT_EOC);
    assert_eq!(f.size, 0);
    assert_no_leak(&fs);
}

#[test]
fn test_delete_corrupted_chain_frees_nothing() {
    let mut fs = mount(16);
    fs.create("a").unwrap();
    let fd = fs.open("a").unwrap();
    fs.write(fd, &pattern(3 * BLOCK_SIZE)).unwrap();
    fs.close(fd).unwrap();
    let mut device = fs.unmount().unwrap();

    // chaîne 1 -> 2 -> 3, le bloc 3 pointe vers le bloc libre 9
    device.blocks[1][6..8].copy_from_slice(&9u16.to_le_bytes());
    let mut fs = FileSystem::new();
    fs.mount(device).unwrap();
    let free_before = fs.info().unwrap().fat_free;

    assert_eq!(fs.delete("a"), Err(FsError::Corrupted));
    assert_eq!(fs.info().unwrap().fat_free, free_before);
    let entries: Vec<_> = fs.list().unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "a");
    assert_eq!(entries[0].head, 1);
}
