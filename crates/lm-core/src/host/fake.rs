//! In-memory host for tests.
//!
//! Files and directories live in maps, commands are answered from scripted
//! responses, and every mutation is recorded so tests can assert on exactly
//! what a flow touched.

use super::{DirEntry, ExecOutput, HostOps, Invocation};
use lm_common::OsFacts;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A state change made through the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateDir(PathBuf),
    RemoveTree(PathBuf),
    RemoveFile(PathBuf),
    Copy { from: PathBuf, to: PathBuf },
    Write(PathBuf),
    SetExecutable(PathBuf),
}

#[derive(Debug, Clone)]
enum Scripted {
    Output(ExecOutput),
    SpawnError,
}

#[derive(Debug)]
struct FakeState {
    facts: OsFacts,
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    once: Vec<(String, Scripted)>,
    sticky: Vec<(String, Scripted)>,
    effects: Vec<(String, Vec<PathBuf>)>,
    commands: Vec<String>,
    mutations: Vec<Mutation>,
    free_bytes: u64,
    privileged: bool,
    registry: BTreeMap<(String, String), String>,
}

/// Scriptable [`HostOps`] with no side effects outside itself.
///
/// Command matching is by substring of the rendered command line. One-shot
/// responses are consumed first, in registration order; sticky responses
/// answer afterwards, most recent registration first. Unmatched commands
/// succeed with empty output.
#[derive(Debug)]
pub struct FakeHost {
    state: RefCell<FakeState>,
}

impl FakeHost {
    pub fn new(facts: OsFacts) -> Self {
        FakeHost {
            state: RefCell::new(FakeState {
                facts,
                files: BTreeMap::new(),
                dirs: BTreeSet::new(),
                once: Vec::new(),
                sticky: Vec::new(),
                effects: Vec::new(),
                commands: Vec::new(),
                mutations: Vec::new(),
                free_bytes: 100 * 1024 * 1024 * 1024,
                privileged: true,
                registry: BTreeMap::new(),
            }),
        }
    }

    pub fn linux() -> Self {
        Self::new(OsFacts {
            family: "Linux".into(),
            distro_id: Some("ubuntu".into()),
            arch: "x86_64".into(),
        })
    }

    pub fn rhel() -> Self {
        Self::new(OsFacts {
            family: "Linux".into(),
            distro_id: Some("rhel".into()),
            arch: "x86_64".into(),
        })
    }

    pub fn windows() -> Self {
        Self::new(OsFacts {
            family: "Windows".into(),
            distro_id: None,
            arch: "AMD64".into(),
        })
    }

    // -- setup ----------------------------------------------------------

    pub fn add_file(&self, path: impl AsRef<Path>, contents: &[u8]) {
        let mut st = self.state.borrow_mut();
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            add_dir_chain(&mut st.dirs, parent);
        }
        st.files.insert(path, contents.to_vec());
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        add_dir_chain(&mut self.state.borrow_mut().dirs, path.as_ref());
    }

    /// Answer every matching command with `output`.
    pub fn respond(&self, pattern: &str, output: ExecOutput) {
        self.state
            .borrow_mut()
            .sticky
            .push((pattern.to_string(), Scripted::Output(output)));
    }

    /// Answer the next matching command with `output`, then forget it.
    pub fn respond_once(&self, pattern: &str, output: ExecOutput) {
        self.state
            .borrow_mut()
            .once
            .push((pattern.to_string(), Scripted::Output(output)));
    }

    /// Make matching commands fail to start.
    pub fn fail_spawn(&self, pattern: &str) {
        self.state
            .borrow_mut()
            .sticky
            .push((pattern.to_string(), Scripted::SpawnError));
    }

    /// Matching commands leave `files` behind, the way an extractor does.
    pub fn creates_files(&self, pattern: &str, files: &[&str]) {
        self.state.borrow_mut().effects.push((
            pattern.to_string(),
            files.iter().map(PathBuf::from).collect(),
        ));
    }

    pub fn set_free_bytes(&self, bytes: u64) {
        self.state.borrow_mut().free_bytes = bytes;
    }

    pub fn set_privileged(&self, privileged: bool) {
        self.state.borrow_mut().privileged = privileged;
    }

    pub fn set_arch(&self, arch: &str) {
        self.state.borrow_mut().facts.arch = arch.to_string();
    }

    pub fn set_registry(&self, key: &str, value: &str, data: &str) {
        self.state
            .borrow_mut()
            .registry
            .insert((key.to_string(), value.to_string()), data.to_string());
    }

    // -- inspection -----------------------------------------------------

    /// Rendered command lines, in execution order.
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    /// Commands containing `needle`.
    pub fn commands_matching(&self, needle: &str) -> Vec<String> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|c| c.contains(needle))
            .cloned()
            .collect()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.borrow().mutations.clone()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state.borrow().files.get(path.as_ref()).cloned()
    }

    /// Forget recorded commands and mutations.
    pub fn clear_log(&self) {
        let mut st = self.state.borrow_mut();
        st.commands.clear();
        st.mutations.clear();
    }

    fn record(&self, m: Mutation) {
        self.state.borrow_mut().mutations.push(m);
    }
}

fn add_dir_chain(dirs: &mut BTreeSet<PathBuf>, path: &Path) {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        dirs.insert(ancestor.to_path_buf());
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: not found", path.display()),
    )
}

impl HostOps for FakeHost {
    fn os_facts(&self) -> OsFacts {
        self.state.borrow().facts.clone()
    }

    fn execute(&self, invocation: &Invocation, _timeout: Option<Duration>) -> io::Result<ExecOutput> {
        let line = invocation.render();
        let mut st = self.state.borrow_mut();
        st.commands.push(line.clone());

        let once_idx = st.once.iter().position(|(p, _)| line.contains(p.as_str()));
        let scripted = match once_idx {
            Some(idx) => Some(st.once.remove(idx).1),
            None => st
                .sticky
                .iter()
                .rev()
                .find(|(p, _)| line.contains(p.as_str()))
                .map(|(_, s)| s.clone()),
        };

        let created: Vec<PathBuf> = st
            .effects
            .iter()
            .filter(|(p, _)| line.contains(p.as_str()))
            .flat_map(|(_, files)| files.iter().cloned())
            .collect();
        if !matches!(scripted, Some(Scripted::SpawnError)) {
            for file in created {
                if let Some(parent) = file.parent() {
                    add_dir_chain(&mut st.dirs, parent);
                }
                let contents = file.to_string_lossy().into_owned().into_bytes();
                st.files.insert(file, contents);
            }
        }

        match scripted {
            Some(Scripted::Output(out)) => Ok(out),
            Some(Scripted::SpawnError) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("cannot start {}", line),
            )),
            None => Ok(ExecOutput::ok("")),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let st = self.state.borrow();
        st.files.contains_key(path) || st.dirs.contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.state.borrow().dirs.contains(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let st = self.state.borrow();
        if !st.dirs.contains(path) {
            return Err(not_found(path));
        }
        let child = |p: &PathBuf| p.parent() == Some(path);
        let mut entries: Vec<DirEntry> = st
            .files
            .keys()
            .filter(|p| child(p))
            .map(|p| (p, true))
            .chain(st.dirs.iter().filter(|p| child(p)).map(|p| (p, false)))
            .filter_map(|(p, is_file)| {
                p.file_name().map(|n| DirEntry {
                    name: n.to_string_lossy().into_owned(),
                    path: p.clone(),
                    is_file,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.state
            .borrow()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.add_dir(path);
        self.record(Mutation::CreateDir(path.to_path_buf()));
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        {
            let mut st = self.state.borrow_mut();
            st.files.retain(|p, _| !p.starts_with(path));
            st.dirs.retain(|p| !p.starts_with(path));
        }
        self.record(Mutation::RemoveTree(path.to_path_buf()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        if self.state.borrow_mut().files.remove(path).is_none() {
            return Err(not_found(path));
        }
        self.record(Mutation::RemoveFile(path.to_path_buf()));
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let data = self.read(from)?;
        let len = data.len() as u64;
        self.add_file(to, &data);
        self.record(Mutation::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        Ok(len)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.add_file(path, contents);
        self.record(Mutation::Write(path.to_path_buf()));
        Ok(())
    }

    fn set_executable(&self, path: &Path) -> io::Result<()> {
        if !self.exists(path) {
            return Err(not_found(path));
        }
        self.record(Mutation::SetExecutable(path.to_path_buf()));
        Ok(())
    }

    fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.state.borrow().free_bytes)
    }

    fn is_privileged(&self) -> bool {
        self.state.borrow().privileged
    }

    fn registry_value(&self, key: &str, value: &str) -> Option<String> {
        self.state
            .borrow()
            .registry
            .get(&(key.to_string(), value.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_then_sticky_then_default() {
        let host = FakeHost::linux();
        host.respond("rpm -qa", ExecOutput::ok("sticky"));
        host.respond_once("rpm -qa", ExecOutput::ok("first"));

        let run = || host.execute(&Invocation::argv("rpm", ["-qa"]), None).unwrap();
        assert_eq!(run().stdout, "first");
        assert_eq!(run().stdout, "sticky");
        assert_eq!(run().stdout, "sticky");

        let other = host.execute(&Invocation::argv("ls", ["-l"]), None).unwrap();
        assert_eq!(other.rc, Some(0));
        assert_eq!(host.commands().len(), 4);
    }

    #[test]
    fn test_list_and_remove_tree() {
        let host = FakeHost::linux();
        host.add_file("/art/linux/b.bin", b"");
        host.add_file("/art/linux/a.bin", b"");
        host.add_dir("/art/linux/extracted");

        let names: Vec<_> = host
            .list_dir(Path::new("/art/linux"))
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_file))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.bin".to_string(), true),
                ("b.bin".to_string(), true),
                ("extracted".to_string(), false)
            ]
        );

        host.remove_tree(Path::new("/art")).unwrap();
        assert!(!host.exists(Path::new("/art/linux/a.bin")));
        assert_eq!(host.mutations(), vec![Mutation::RemoveTree("/art".into())]);
    }

    #[test]
    fn test_spawn_error() {
        let host = FakeHost::linux();
        host.fail_spawn("dos2unix");
        assert!(host
            .execute(&Invocation::argv("dos2unix", ["f"]), None)
            .is_err());
    }

    #[test]
    fn test_command_effects_create_files() {
        let host = FakeHost::rhel();
        host.creates_files("-q -d", &["/art/extracted/TIVsm-BA-8.1.20-0.x86_64.rpm"]);
        host.execute(&Invocation::argv("/art/x.bin", ["-q", "-d", "/art/extracted"]), None)
            .unwrap();
        assert!(host.is_dir(Path::new("/art/extracted")));
        assert!(host.exists(Path::new("/art/extracted/TIVsm-BA-8.1.20-0.x86_64.rpm")));
        // effects are not mutations made through the host API
        assert!(host.mutations().is_empty());
    }
}
