//! Program collection

use std::sync::Arc;

use super::entry::{Program, STILL_STREAM_BITRATE};
use crate::error::{Error, Result};
use crate::registry::{FanoutSink, HandoffTarget, HandoffTargets, TargetInfo};
use crate::stats::Metrics;

/// Programs in registration order
#[derive(Debug, Default)]
pub struct ProgramSet {
    programs: Vec<Program>,
}

impl ProgramSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, program: Program) -> Result<()> {
        if self.get(&program.name).is_some() {
            return Err(Error::Config(format!("program {} already exists", program.name)));
        }
        self.programs.push(program);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Program> {
        let index = self.programs.iter().position(|p| p.name == name)?;
        Some(self.programs.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Program> {
        self.programs.iter_mut().find(|p| p.name == name)
    }

    /// Program whose live source is `client`
    pub fn by_push_client(&mut self, client: crate::registry::ClientId) -> Option<&mut Program> {
        self.programs
            .iter_mut()
            .find(|p| p.push_client == Some(client))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Program> {
        self.programs.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.programs.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl HandoffTargets for ProgramSet {
    fn lookup(&self, target: &HandoffTarget) -> Option<TargetInfo> {
        let program = self.get(&target.program)?;
        let program_up = program.enabled && program.is_running();

        match target.stream {
            Some(index) => {
                let stream = program.stream(index)?;
                Some(TargetInfo {
                    available: program_up && stream.playing,
                    bitrate: stream.bitrate,
                    sink: stream.pipeline.as_ref().map(|p| p.sink()),
                })
            }
            None => Some(TargetInfo {
                available: program_up,
                bitrate: STILL_STREAM_BITRATE,
                sink: Some(Arc::clone(&program.still_sink) as Arc<dyn FanoutSink>),
            }),
        }
    }

    fn with_metrics(&mut self, target: &HandoffTarget, f: &mut dyn FnMut(&mut Metrics)) {
        let Some(program) = self.get_mut(&target.program) else {
            return;
        };
        if let Some(stream) = target.stream.and_then(|i| program.stream_mut(i)) {
            f(&mut stream.metrics);
        }
        f(&mut program.metrics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::entry::{ProgramKind, ProgramState};
    use crate::program::stream::{Stream, StreamType};

    fn set() -> ProgramSet {
        let mut set = ProgramSet::new();
        let mut program = Program::new("live", ProgramKind::Manual, None);
        program.push_stream(|name, i| Stream::new(name, i, StreamType::Webm, 640, 360, 600_000));
        set.add(program).unwrap();
        set
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut set = set();
        let dup = Program::new("live", ProgramKind::Manual, None);
        assert!(matches!(set.add(dup), Err(Error::Config(_))));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_lookup_availability() {
        let mut set = set();
        let target = HandoffTarget::stream("live", 0);

        let info = set.lookup(&target).unwrap();
        assert!(!info.available);
        assert_eq!(info.bitrate, 600_000);
        assert!(info.sink.is_none());

        let program = set.get_mut("live").unwrap();
        program.enabled = true;
        program.state = ProgramState::Running;
        // Stream not playing yet
        assert!(!set.lookup(&target).unwrap().available);

        set.get_mut("live").unwrap().streams[0].playing = true;
        assert!(set.lookup(&target).unwrap().available);

        assert!(set.lookup(&HandoffTarget::stream("live", 1)).is_none());
        assert!(set.lookup(&HandoffTarget::stream("other", 0)).is_none());

        let still = set.lookup(&HandoffTarget::program("live")).unwrap();
        assert!(still.available);
        assert_eq!(still.bitrate, STILL_STREAM_BITRATE);
    }

    #[test]
    fn test_metrics_stream_then_program() {
        let mut set = set();
        let mut touched = 0;
        set.with_metrics(&HandoffTarget::stream("live", 0), &mut |m| {
            m.add_client(1000);
            touched += 1;
        });
        assert_eq!(touched, 2);

        let program = set.get("live").unwrap();
        assert_eq!(program.metrics.bitrate, 1000);
        assert_eq!(program.streams[0].metrics.n_clients, 1);

        set.with_metrics(&HandoffTarget::program("live"), &mut |m| m.add_client(5));
        assert_eq!(set.get("live").unwrap().metrics.n_clients, 2);
        assert_eq!(set.get("live").unwrap().streams[0].metrics.n_clients, 1);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut set = set();
        set.add(Program::new("b", ProgramKind::Manual, None)).unwrap();
        set.add(Program::new("c", ProgramKind::Manual, None)).unwrap();

        assert!(set.remove("b").is_some());
        assert!(set.remove("b").is_none());
        assert_eq!(set.names(), vec!["live".to_string(), "c".to_string()]);
    }
}
