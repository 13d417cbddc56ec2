use std::collections::{HashSet, VecDeque};

use crate::error::Error;
use crate::sector::SectorSize;
use crate::volume::Volume;

use super::dir::{DirectoryBrowser, DirectoryEntry};
use super::sync::Synced;
use super::Ext4;

/// Which directories a walk stays out of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Directories with one of these names are yielded but not descended
    /// into, at any depth
    pub skip_names: Vec<Vec<u8>>,
}

impl Default for WalkOptions {
    fn default() -> WalkOptions {
        WalkOptions {
            skip_names: vec![b"lost+found".to_vec()],
        }
    }
}

impl WalkOptions {
    pub fn skip_nothing() -> WalkOptions {
        WalkOptions {
            skip_names: Vec::new(),
        }
    }

    pub fn skip(mut self, name: &[u8]) -> WalkOptions {
        self.skip_names.push(name.to_vec());
        self
    }

    fn is_skipped(&self, name: &[u8]) -> bool {
        self.skip_names.iter().any(|skipped| skipped.as_slice() == name)
    }
}

/// Breadth-first enumeration of every entry below a directory.
///
/// Yields `(path, entry)` pairs where the path is relative to the starting
/// directory, with `/` between components. The entries of one directory
/// come out together, in on-disk order. The first error ends the walk.
/// Reaching a directory inode a second time is a `DirectoryCycle` error.
pub struct DirectoryWalk<S: SectorSize, V: Volume<u8, S>> {
    fs: Synced<Ext4<S, V>>,
    queue: VecDeque<(String, DirectoryBrowser<S, V>)>,
    /// Directory inodes already queued
    visited: HashSet<u32>,
    options: WalkOptions,
}

impl<S: SectorSize, V: Volume<u8, S>> DirectoryWalk<S, V> {
    pub fn new(
        fs: &Synced<Ext4<S, V>>,
        root: u32,
    ) -> Result<DirectoryWalk<S, V>, Error> {
        DirectoryWalk::with_options(fs, root, WalkOptions::default())
    }

    pub fn with_options(
        fs: &Synced<Ext4<S, V>>,
        root: u32,
        options: WalkOptions,
    ) -> Result<DirectoryWalk<S, V>, Error> {
        let browser = fs.inode_nth(root)?.directory()?;
        let mut queue = VecDeque::new();
        queue.push_back((String::new(), browser));
        let mut visited = HashSet::new();
        visited.insert(root);
        Ok(DirectoryWalk {
            fs: fs.clone(),
            queue,
            visited,
            options,
        })
    }

    /// Directories opened but not yet fully read.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn next_entry(
        &mut self,
    ) -> Result<Option<(String, DirectoryEntry)>, Error> {
        match self.advance() {
            Err(err) => {
                self.queue.clear();
                Err(err)
            }
            ok => ok,
        }
    }

    fn advance(&mut self) -> Result<Option<(String, DirectoryEntry)>, Error> {
        loop {
            let next = match self.queue.front_mut() {
                None => return Ok(None),
                Some(&mut (ref prefix, ref mut browser)) => browser
                    .next_entry()?
                    .map(|entry| (prefix.clone(), entry)),
            };
            let (prefix, entry) = match next {
                Some(next) => next,
                None => {
                    if let Some((prefix, browser)) = self.queue.pop_front() {
                        debug!(
                            "finished directory {} ({:?})",
                            browser.inode(),
                            prefix
                        );
                    }
                    continue;
                }
            };

            if entry.name == b"." || entry.name == b".." {
                continue;
            }

            let path = if prefix.is_empty() {
                entry.name_str().into_owned()
            } else {
                format!("{}/{}", prefix, entry.name_str())
            };

            if entry.is_dir() {
                if self.options.is_skipped(&entry.name) {
                    debug!("not descending into {:?}", path);
                } else {
                    if !self.visited.insert(entry.inode) {
                        warn!("directory {} reached again at {:?}", entry.inode, path);
                        return Err(Error::DirectoryCycle { inode: entry.inode });
                    }
                    let browser = self.fs.inode_nth(entry.inode)?.directory()?;
                    debug!("queued directory {} ({:?})", entry.inode, path);
                    self.queue.push_back((path.clone(), browser));
                }
            }

            return Ok(Some((path, entry)));
        }
    }
}

impl<S: SectorSize, V: Volume<u8, S>> Iterator for DirectoryWalk<S, V> {
    type Item = Result<(String, DirectoryEntry), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_image::{ImageBuilder, ROOT_INODE};
    use super::*;
    use crate::sector::Size512;
    use crate::sys::dir_entry::FileType;

    fn tree() -> Vec<u8> {
        let mut builder = ImageBuilder::new();
        let a = builder.add_file(b"a");
        let b = builder.add_file(b"b");
        let c = builder.add_file(b"c");
        let d = builder.add_file(b"d");
        let deeper = builder.add_dir(&[("d.txt", d, FileType::RegularFile)]);
        let sub = builder.add_dir(&[
            ("b.txt", b, FileType::RegularFile),
            ("deeper", deeper, FileType::Directory),
        ]);
        let lost = builder.add_dir(&[("c.txt", c, FileType::RegularFile)]);
        builder.add_root_entry(b"a.txt", a, FileType::RegularFile);
        builder.add_root_entry(b"sub", sub, FileType::Directory);
        builder.add_root_entry(b"lost+found", lost, FileType::Directory);
        builder.finish()
    }

    fn paths<S: SectorSize, V: Volume<u8, S>>(
        walk: DirectoryWalk<S, V>,
    ) -> Vec<String> {
        walk.map(|entry| entry.unwrap().0).collect()
    }

    #[test]
    fn order() {
        let fs = Synced::<Ext4<Size512, _>>::new(tree()).unwrap();
        let walk = DirectoryWalk::new(&fs, ROOT_INODE).unwrap();
        assert_eq!(walk.pending(), 1);

        assert_eq!(
            paths(walk),
            vec![
                "a.txt",
                "sub",
                "lost+found",
                "sub/b.txt",
                "sub/deeper",
                "sub/deeper/d.txt",
            ]
        );
    }

    #[test]
    fn no_dot_entries() {
        let fs = Synced::<Ext4<Size512, _>>::new(tree()).unwrap();
        for entry in fs.walk_with(WalkOptions::skip_nothing()).unwrap() {
            let (path, entry) = entry.unwrap();
            assert_ne!(entry.name, b".");
            assert_ne!(entry.name, b"..");
            assert!(!path.ends_with('.'), "{}", path);
        }
    }

    #[test]
    fn skip_lists() {
        let fs = Synced::<Ext4<Size512, _>>::new(tree()).unwrap();

        let all = paths(fs.walk_with(WalkOptions::skip_nothing()).unwrap());
        assert_eq!(all.len(), 7);
        assert_eq!(all[5], "lost+found/c.txt");
        assert_eq!(all[6], "sub/deeper/d.txt");

        let custom = paths(
            fs.walk_with(WalkOptions::default().skip(b"deeper")).unwrap(),
        );
        assert_eq!(
            custom,
            vec!["a.txt", "sub", "lost+found", "sub/b.txt", "sub/deeper"]
        );
    }

    #[test]
    fn walk_from_subdirectory() {
        let fs = Synced::<Ext4<Size512, _>>::new(tree()).unwrap();
        let (_, sub) = fs
            .walk()
            .unwrap()
            .map(Result::unwrap)
            .find(|(path, _)| path == "sub")
            .unwrap();

        let walk = DirectoryWalk::new(&fs, sub.inode).unwrap();
        assert_eq!(paths(walk), vec!["b.txt", "deeper", "deeper/d.txt"]);
    }

    #[test]
    fn caller_supplied_descriptor() {
        let image = tree();
        let (superblock, descriptor) = {
            let fs = Ext4::<Size512, _>::new(image.clone()).unwrap();
            (*fs.superblock(), *fs.descriptor(0).unwrap())
        };
        let fs = Synced::with_inner(
            Ext4::<Size512, _>::with_descriptor(image, superblock, descriptor)
                .unwrap(),
        );
        assert_eq!(paths(fs.walk().unwrap()).len(), 6);
    }

    #[test]
    fn errors_end_the_walk() {
        let mut builder = ImageBuilder::new();
        let a = builder.add_file(b"a");
        let plain = builder.add_file(b"not a directory");
        let sub = builder.add_dir(&[]);
        builder.add_root_entry(b"a.txt", a, FileType::RegularFile);
        builder.add_root_entry(b"sub", sub, FileType::Directory);
        // tagged as a directory, but the inode is a regular file
        builder.add_root_entry(b"broken", plain, FileType::Directory);
        let fs = Synced::<Ext4<Size512, _>>::new(builder.finish()).unwrap();

        let mut walk = fs.walk().unwrap();
        assert_eq!(walk.next().unwrap().unwrap().0, "a.txt");
        assert_eq!(walk.next().unwrap().unwrap().0, "sub");
        assert_eq!(walk.pending(), 2);
        assert!(matches!(
            walk.next(),
            Some(Err(Error::NotADirectory { .. }))
        ));
        assert_eq!(walk.pending(), 0);
        assert!(walk.next().is_none());
    }

    #[test]
    fn cycles_end_the_walk() {
        let mut builder = ImageBuilder::new();
        let a = builder.add_file(b"a");
        let sub = builder.add_dir(&[("up", ROOT_INODE, FileType::Directory)]);
        builder.add_root_entry(b"a.txt", a, FileType::RegularFile);
        builder.add_root_entry(b"sub", sub, FileType::Directory);
        let fs = Synced::<Ext4<Size512, _>>::new(builder.finish()).unwrap();

        let mut walk = fs.walk().unwrap();
        assert_eq!(walk.next().unwrap().unwrap().0, "a.txt");
        assert_eq!(walk.next().unwrap().unwrap().0, "sub");
        assert!(matches!(
            walk.next(),
            Some(Err(Error::DirectoryCycle { inode: ROOT_INODE }))
        ));
        assert_eq!(walk.pending(), 0);
        assert!(walk.next().is_none());
    }

    #[test]
    fn skipped_names_are_not_visited() {
        let mut builder = ImageBuilder::new();
        let shared = builder.add_dir(&[]);
        builder.add_root_entry(b"lost+found", shared, FileType::Directory);
        builder.add_root_entry(b"kept", shared, FileType::Directory);
        let fs = Synced::<Ext4<Size512, _>>::new(builder.finish()).unwrap();

        assert_eq!(paths(fs.walk().unwrap()), vec!["lost+found", "kept"]);
    }

    #[test]
    fn not_a_directory() {
        let mut builder = ImageBuilder::new();
        let file = builder.add_file(b"x");
        let fs = Synced::<Ext4<Size512, _>>::new(builder.finish()).unwrap();

        assert!(matches!(
            DirectoryWalk::new(&fs, file),
            Err(Error::NotADirectory { .. })
        ));
    }
}
