// CLI pour le système de fichiers
use std::env;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::process;

use log::{Level, LevelFilter, Log};
use owo_colors::OwoColorize;
use simplefs::{
    format_volume, Block, BlockDevice, FileSystem, FsError, Result, Superblock, BLOCK_SIZE,
    MAX_DATA_BLOCKS,
};

/// Device basé sur un fichier image
struct FileDevice {
    file: File,
    blocks: usize,
}

impl FileDevice {
    fn open(path: &str) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        let blocks = (file.metadata()?.len() / BLOCK_SIZE as u64) as usize;
        Ok(Self { file, blocks })
    }

    /// Créer (ou tronquer) une image de `blocks` blocs
    fn create(path: &str, blocks: usize) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((blocks * BLOCK_SIZE) as u64)?;
        Ok(Self { file, blocks })
    }
}

impl BlockDevice for FileDevice {
    fn read_block(&mut self, index: usize, buffer: &mut Block) -> Result<()> {
        if index >= self.blocks {
            return Err(FsError::IoError);
        }
        self.file
            .seek(SeekFrom::Start((index * BLOCK_SIZE) as u64))
            .map_err(|_| FsError::IoError)?;
        self.file.read_exact(buffer).map_err(|_| FsError::IoError)
    }

    fn write_block(&mut self, index: usize, buffer: &Block) -> Result<()> {
        if index >= self.blocks {
            return Err(FsError::IoError);
        }
        self.file
            .seek(SeekFrom::Start((index * BLOCK_SIZE) as u64))
            .map_err(|_| FsError::IoError)?;
        self.file.write_all(buffer).map_err(|_| FsError::IoError)
    }

    fn block_count(&self) -> usize {
        self.blocks
    }

    fn close(&mut self) -> Result<()> {
        self.file.sync_all().map_err(|_| FsError::IoError)
    }
}

/// Logger minimal sur stderr
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = record.level();
        let tag = format!("{level:5}");
        let tag: &dyn std::fmt::Display = match level {
            Level::Error => &tag.bright_red(),
            Level::Warn => &tag.bright_yellow(),
            Level::Info => &tag.bright_blue(),
            Level::Debug => &tag.bright_cyan(),
            Level::Trace => &tag.bright_magenta(),
        };
        eprintln!("{} {} {}", tag, record.target().dimmed(), record.args());
    }

    fn flush(&self) {}
}

fn init_logger(verbosity: usize) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn print_help(program: &str) {
    println!("Système de fichiers FAT simple");
    println!();
    println!("Usage: {} [-v|-vv] <image> <commande> [args]", program);
    println!();
    println!("Commandes:");
    println!("  mkfs <blocs>          Crée une image de <blocs> blocs de données");
    println!("  info                  Affiche les informations du volume");
    println!("  ls                    Liste les fichiers");
    println!("  create <nom>          Crée un fichier vide");
    println!("  rm <nom>              Supprime un fichier");
    println!("  cat <nom>             Affiche un fichier");
    println!("  add <fichier> [nom]   Copie un fichier de l'hôte dans l'image");
    println!("  stat <nom>            Affiche la taille d'un fichier");
    println!("  check                 Vérifie la cohérence de la FAT");
    println!();
    println!("Exemples:");
    println!("  {} disk.fs mkfs 8192", program);
    println!("  {} disk.fs add readme.txt", program);
    println!("  {} disk.fs cat readme.txt", program);
}

fn usage_error(program: &str, message: &str) -> ! {
    eprintln!("Erreur: {}", message);
    print_help(program);
    process::exit(1);
}

fn cat(fs: &mut FileSystem<FileDevice>, name: &str) -> Result<()> {
    let fd = fs.open(name)?;
    let mut buffer = vec![0u8; BLOCK_SIZE];
    let mut stdout = io::stdout();
    let result = loop {
        match fs.read(fd, &mut buffer) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if stdout.write_all(&buffer[..n]).is_err() {
                    break Err(FsError::IoError);
                }
            }
            Err(e) => break Err(e),
        }
    };
    fs.close(fd)?;
    result
}

fn add(fs: &mut FileSystem<FileDevice>, host_path: &str, name: &str) -> Result<()> {
    let data = std::fs::read(host_path).map_err(|_| FsError::IoError)?;
    match fs.create(name) {
        Ok(()) | Err(FsError::AlreadyExists) => {}
        Err(e) => return Err(e),
    }
    let fd = fs.open(name)?;
    let written = fs.write(fd, &data);
    fs.close(fd)?;
    let written = written?;
    if written < data.len() {
        eprintln!("Attention: {} octets écrits sur {} (volume plein)", written, data.len());
    }
    println!("{} octets copiés dans '{}'", written, name);
    Ok(())
}

fn run(fs: &mut FileSystem<FileDevice>, program: &str, cmd: &str, args: &[String]) -> Result<()> {
    match cmd {
        "info" => {
            println!("{}", fs.info()?);
            Ok(())
        }

        "ls" => {
            println!("FS Ls:");
            for entry in fs.list()? {
                println!("file: {}, size: {}, data_blk: {}", entry.name, entry.size, entry.head);
            }
            Ok(())
        }

        "create" => {
            let Some(name) = args.first() else { usage_error(program, "nom manquant") };
            fs.create(name)
        }

        "rm" => {
            let Some(name) = args.first() else { usage_error(program, "nom manquant") };
            fs.delete(name)
        }

        "cat" => {
            let Some(name) = args.first() else { usage_error(program, "nom manquant") };
            cat(fs, name)
        }

        "add" => {
            let Some(host_path) = args.first() else { usage_error(program, "fichier manquant") };
            let name = match args.get(1) {
                Some(name) => name.as_str(),
                None => std::path::Path::new(host_path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(host_path),
            };
            add(fs, host_path, name)
        }

        "stat" => {
            let Some(name) = args.first() else { usage_error(program, "nom manquant") };
            let fd = fs.open(name)?;
            let size = fs.stat(fd);
            fs.close(fd)?;
            println!("Size of file '{}' is {} bytes", name, size?);
            Ok(())
        }

        "check" => {
            fs.check()?;
            println!("Volume cohérent");
            Ok(())
        }

        _ => usage_error(program, &format!("commande inconnue: {}", cmd)),
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let verbosity = match args.first().map(String::as_str) {
        Some("-v") => 1,
        Some("-vv") => 2,
        _ => 0,
    };
    if verbosity > 0 {
        args.remove(0);
    }
    init_logger(verbosity);

    if args.len() < 2 {
        print_help(&program);
        return Ok(());
    }

    let image_path = args.remove(0);
    let cmd = args.remove(0);

    if cmd == "mkfs" {
        let data_blocks: u16 = match args.first().map(|s| s.parse()) {
            Some(Ok(n)) if n > 0 && n as usize <= MAX_DATA_BLOCKS => n,
            _ => usage_error(&program, "nombre de blocs invalide"),
        };
        let sb = Superblock::new(data_blocks);
        let mut device = FileDevice::create(&image_path, sb.total_blocks as usize)?;
        format_volume(&mut device, data_blocks)?;
        device.close()?;
        println!("Image '{}' créée: {} blocs", image_path, sb.total_blocks);
        return Ok(());
    }

    // Ouvrir l'image
    let device = match FileDevice::open(&image_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Erreur: impossible d'ouvrir '{}': {}", image_path, e);
            process::exit(1);
        }
    };

    let mut fs = FileSystem::new();
    if let Err(e) = fs.mount(device) {
        eprintln!("Erreur: {}", e);
        process::exit(1);
    }

    let result = run(&mut fs, &program, &cmd, &args);
    let unmounted = fs.unmount();

    if let Err(e) = result {
        eprintln!("Erreur: {}", e);
        return Err(e.into());
    }
    unmounted?;
    Ok(())
}
