use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlledger_common::{Direction, Error, Result};
use tracing::debug;

use crate::checksum::checksum;

static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{10}_.*)\.(up|down)\.sql$").expect("migration filename pattern compiles")
});

/// A paired up/down migration read from disk.
///
/// Ids start with a fixed-width ten digit prefix, so sorting ids as strings
/// sorts them chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub id: String,
    pub up: String,
    pub down: String,
}

impl Migration {
    pub fn new(id: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    pub fn checksum(&self) -> String {
        checksum(&self.id, &self.up, &self.down)
    }
}

/// One matched file: half of a migration pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: String,
    pub direction: Direction,
    pub path: PathBuf,
    pub sql: String,
}

/// How many files were found for one direction of one id.
enum Found<T> {
    None,
    One(T),
    Many(Vec<T>),
}

impl<T> Found<T> {
    fn from_vec(mut items: Vec<T>) -> Self {
        match items.len() {
            0 => Found::None,
            1 => Found::One(items.remove(0)),
            _ => Found::Many(items),
        }
    }
}

/// Split a filename into `(id, direction)`, or `None` if it is not a
/// migration filename.
pub fn parse_filename(name: &str) -> Option<(String, Direction)> {
    let caps = FILENAME_PATTERN.captures(name)?;
    let direction = match &caps[2] {
        "up" => Direction::Up,
        _ => Direction::Down,
    };
    Some((caps[1].to_string(), direction))
}

/// Read every migration in `dir` and return them sorted ascending by id.
///
/// The directory is not searched recursively. Every entry must be a
/// migration file; anything else fails the whole load, before the caller
/// touches a database.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    let fragments = scan(dir)?;
    debug!(
        "read {} migration files from {}",
        fragments.len(),
        dir.display()
    );
    assemble(dir, fragments)
}

fn scan(dir: &Path) -> Result<Vec<Fragment>> {
    let unreadable = |source| Error::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut matched = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        let parsed = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_filename);
        match parsed {
            Some((id, direction)) => matched.push((id, direction, path)),
            None => return Err(Error::InvalidFilename { path }),
        }
    }
    matched.sort_by(|a, b| a.2.cmp(&b.2));

    matched
        .into_iter()
        .map(|(id, direction, path)| {
            let sql = std::fs::read_to_string(&path).map_err(|source| Error::FileUnreadable {
                path: path.clone(),
                source,
            })?;
            Ok(Fragment {
                id,
                direction,
                path,
                sql,
            })
        })
        .collect()
}

/// Pair fragments by id. Each id needs exactly one up and one down file.
pub fn assemble(dir: &Path, fragments: Vec<Fragment>) -> Result<Vec<Migration>> {
    let mut by_id: BTreeMap<String, (Vec<Fragment>, Vec<Fragment>)> = BTreeMap::new();
    for fragment in fragments {
        let slot = by_id.entry(fragment.id.clone()).or_default();
        match fragment.direction {
            Direction::Up => slot.0.push(fragment),
            Direction::Down => slot.1.push(fragment),
        }
    }

    by_id
        .into_iter()
        .map(|(id, (ups, downs))| {
            let up = pick(dir, &id, Direction::Up, ups)?;
            let down = pick(dir, &id, Direction::Down, downs)?;
            Ok(Migration { id, up, down })
        })
        .collect()
}

fn pick(dir: &Path, id: &str, direction: Direction, fragments: Vec<Fragment>) -> Result<String> {
    match Found::from_vec(fragments) {
        Found::One(fragment) => Ok(fragment.sql),
        Found::None => Err(Error::MissingFile {
            id: id.to_string(),
            direction,
            path: dir.join(format!("{id}.{direction}.sql")),
        }),
        Found::Many(fragments) => Err(Error::DuplicateFile {
            id: id.to_string(),
            direction,
            paths: fragments.into_iter().map(|f| f.path).collect(),
        }),
    }
}
