//! Unpacking and repacking of `.ewsx` schedule archives.
//!
//! A schedule is a zip container with one embedded SQLite database plus
//! resource members (backgrounds, media references) that are carried through
//! untouched.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// File name EasyWorship gives the schedule database.
pub const DATABASE_MEMBER: &str = "main.db";

const DATABASE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// The archive member that holds the schedule database.
#[derive(Debug, Clone)]
pub struct DatabaseMember {
    pub index: usize,
    pub name: String,
    pub compression: CompressionMethod,
}

/// An input schedule, opened read-only.
pub struct ScheduleArchive {
    path: PathBuf,
    zip: ZipArchive<File>,
    member: DatabaseMember,
}

/// Private working copy of the database. The directory (and any SQLite
/// journal next to the database) is removed when this is dropped.
pub struct WorkingDatabase {
    dir: TempDir,
    path: PathBuf,
}

impl WorkingDatabase {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl ScheduleArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::io(format!("cannot open {}", path.display()), e))?;
        let mut zip = ZipArchive::new(file)
            .map_err(|e| Error::zip(format!("{} is not a zip container", path.display()), e))?;

        let mut names = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip
                .by_index_raw(index)
                .map_err(|e| Error::zip(format!("reading entry #{index}"), e))?;
            if !entry.is_dir() {
                names.push((index, entry.name().to_string(), entry.compression()));
            }
        }

        let member = locate_database(&names)?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
            member,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn member(&self) -> &DatabaseMember {
        &self.member
    }

    /// Extract the database member into a fresh temporary directory.
    pub fn extract_database(&mut self) -> Result<WorkingDatabase> {
        let dir = tempfile::Builder::new()
            .prefix("ewsx-replace-")
            .tempdir()
            .map_err(|e| Error::io("failed to create temporary directory", e))?;
        let path = dir.path().join(DATABASE_MEMBER);

        let name = self.member.name.clone();
        let mut entry = self
            .zip
            .by_index(self.member.index)
            .map_err(|e| Error::zip(format!("opening member {name}"), e))?;
        let mut out = File::create(&path)
            .map_err(|e| Error::io(format!("cannot create {}", path.display()), e))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| Error::io(format!("extracting member {name}"), e))?;
        out.sync_all()
            .map_err(|e| Error::io(format!("flushing {}", path.display()), e))?;
        drop(out);

        check_sqlite_header(&path, &name)?;
        Ok(WorkingDatabase { dir, path })
    }

    /// Write a new archive at `dest`: every member of this archive in its
    /// original order, with the database member taken from `working` when
    /// `edited` is set. The archive is assembled next to `dest` and moved
    /// into place only once complete.
    pub fn repack(
        &mut self,
        working: &WorkingDatabase,
        edited: bool,
        dest: &Path,
        overwrite: bool,
    ) -> Result<()> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| {
            Error::io(format!("output directory {} is not writable", parent.display()), e)
        })?;

        {
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            for index in 0..self.zip.len() {
                if index == self.member.index && edited {
                    self.write_database(&mut writer, working)?;
                    continue;
                }
                let entry = self
                    .zip
                    .by_index_raw(index)
                    .map_err(|e| Error::zip(format!("reading entry #{index}"), e))?;
                writer
                    .raw_copy_file(entry)
                    .map_err(|e| Error::zip(format!("copying entry #{index}"), e))?;
            }
            writer
                .finish()
                .map_err(|e| Error::zip("finalizing output archive", e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io("flushing output archive", e))?;

        let persisted = if overwrite {
            tmp.persist(dest)
        } else {
            tmp.persist_noclobber(dest)
        };
        persisted.map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                Error::OutputExists(dest.to_path_buf())
            } else {
                Error::io(format!("cannot write {}", dest.display()), e.error)
            }
        })?;
        Ok(())
    }

    fn write_database<W: Write + io::Seek>(
        &self,
        writer: &mut ZipWriter<W>,
        working: &WorkingDatabase,
    ) -> Result<()> {
        let method = match self.member.compression {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default().compression_method(method);
        writer
            .start_file(self.member.name.as_str(), options)
            .map_err(|e| Error::zip(format!("adding member {}", self.member.name), e))?;
        let mut db = File::open(working.path())
            .map_err(|e| Error::io(format!("cannot read {}", working.path().display()), e))?;
        io::copy(&mut db, writer)
            .map_err(|e| Error::io(format!("writing member {}", self.member.name), e))?;
        Ok(())
    }
}

fn is_database_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            DATABASE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Pick the database member among `(index, name, compression)` entries.
fn locate_database(entries: &[(usize, String, CompressionMethod)]) -> Result<DatabaseMember> {
    let candidates: Vec<_> = entries
        .iter()
        .filter(|e| is_database_name(&e.1))
        .collect();

    let chosen = match candidates.len() {
        0 => {
            return Err(Error::Format(
                "no embedded database member found".to_string(),
            ));
        }
        1 => candidates[0],
        _ => {
            let conventional: Vec<_> = candidates
                .iter()
                .copied()
                .filter(|e| file_name(&e.1).eq_ignore_ascii_case(DATABASE_MEMBER))
                .collect();
            let at_root: Vec<_> = conventional
                .iter()
                .copied()
                .filter(|e| !e.1.contains('/'))
                .collect();
            if let [root] = at_root.as_slice() {
                *root
            } else if let [single] = conventional.as_slice() {
                *single
            } else {
                let names: Vec<&str> = candidates.iter().map(|e| e.1.as_str()).collect();
                return Err(Error::Format(format!(
                    "cannot tell which database member to edit: {}",
                    names.join(", ")
                )));
            }
        }
    };

    Ok(DatabaseMember {
        index: chosen.0,
        name: chosen.1.clone(),
        compression: chosen.2,
    })
}

fn check_sqlite_header(path: &Path, member: &str) -> Result<()> {
    let len = fs::metadata(path)
        .map_err(|e| Error::io(format!("cannot stat {}", path.display()), e))?
        .len();
    if len == 0 {
        return Ok(());
    }
    let mut header = [0u8; 16];
    let read = File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map(|_| true)
        .or_else(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Ok(false),
            _ => Err(e),
        })
        .map_err(|e| Error::io(format!("cannot read {}", path.display()), e))?;
    if !read || &header != SQLITE_MAGIC {
        return Err(Error::Format(format!(
            "member {member} is not an SQLite database"
        )));
    }
    Ok(())
}
