use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::encode::encode;
use crate::error::{Error, Result};
use crate::model::{BackendProperties, FromDict, JobResult};
use crate::value::ToValue;

#[derive(Clone, Copy, Debug, Default)]
pub struct SaveOpts {
    /// Indented output instead of a single line.
    pub pretty: bool,
}

/// One object or a list of objects, depending on what the file held.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> Loaded<T> {
    pub fn is_single(&self) -> bool {
        matches!(self, Loaded::Single(_))
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Loaded::Single(item) => std::slice::from_ref(item),
            Loaded::Many(items) => items,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// The object when the file held exactly one mapping.
    pub fn single(self) -> Option<T> {
        match self {
            Loaded::Single(item) => Some(item),
            Loaded::Many(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Loaded::Single(item) => vec![item],
            Loaded::Many(items) => items,
        }
    }
}

impl<T> IntoIterator for Loaded<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

pub fn to_json_value<T: ToValue + ?Sized>(obj: &T) -> Result<serde_json::Value> {
    Ok(encode(&obj.to_value())?)
}

pub fn to_json_string<T: ToValue + ?Sized>(obj: &T, opts: SaveOpts) -> Result<String> {
    let json = to_json_value(obj)?;
    Ok(if opts.pretty {
        format!("{json:#}")
    } else {
        json.to_string()
    })
}

pub fn save_to_json<T: ToValue + ?Sized>(obj: &T, path: impl AsRef<Path>) -> Result<()> {
    save_to_json_with(obj, path, SaveOpts::default())
}

/// Encode `obj` and write it to `path`, creating or truncating the file.
///
/// Encoding finishes before the file is opened, so an unsupported value
/// leaves any existing file untouched. There is no atomic rename: an I/O
/// failure mid-write can leave a truncated file behind.
pub fn save_to_json_with<T: ToValue + ?Sized>(
    obj: &T,
    path: impl AsRef<Path>,
    opts: SaveOpts,
) -> Result<()> {
    let path = path.as_ref();
    let json = to_json_value(obj)?;
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut w = BufWriter::new(file);
    let written = if opts.pretty {
        serde_json::to_writer_pretty(&mut w, &json)
    } else {
        serde_json::to_writer(&mut w, &json)
    };
    written.map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    w.flush().map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), pretty = opts.pretty, "saved json");
    Ok(())
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse `path` and rebuild a single `T` from it.
pub fn load_from_json<T: FromDict>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let value = read_json(path)?;
    let out = T::from_dict(value)?;
    debug!(path = %path.display(), "loaded json object");
    Ok(out)
}

/// Parse `path`; a top-level array yields `Many` (file order), anything else `Single`.
pub fn load_one_or_many<T: FromDict>(path: impl AsRef<Path>) -> Result<Loaded<T>> {
    let path = path.as_ref();
    let loaded = match read_json(path)? {
        serde_json::Value::Array(items) => Loaded::Many(
            items
                .into_iter()
                .map(T::from_dict)
                .collect::<Result<Vec<_>>>()?,
        ),
        other => Loaded::Single(T::from_dict(other)?),
    };
    debug!(
        path = %path.display(),
        count = loaded.len(),
        single = loaded.is_single(),
        "loaded json"
    );
    Ok(loaded)
}

pub fn load_properties(path: impl AsRef<Path>) -> Result<BackendProperties> {
    load_from_json(path)
}

pub fn load_result(path: impl AsRef<Path>) -> Result<Loaded<JobResult>> {
    load_one_or_many(path)
}

/// Saved runs in `dir`: regular files ending in `.json`, not recursing,
/// sorted by path. A directory that cannot be read has no saved runs.
pub fn find_json_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(rd) = fs::read_dir(dir) {
        for entry in rd.flatten() {
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json") {
                out.push(p);
            }
        }
    }
    out.sort();
    out
}

/// Load every `*.json` in `dir` as results. A failing file is reported in
/// place and does not stop the others.
pub fn load_results_dir(dir: &Path) -> Vec<(PathBuf, Result<Loaded<JobResult>>)> {
    find_json_files(dir)
        .into_iter()
        .map(|p| {
            let res = load_result(&p);
            if let Err(e) = &res {
                warn!(path = %p.display(), error = %e, "skipping unreadable result file");
            }
            (p, res)
        })
        .collect()
}
