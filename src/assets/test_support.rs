//! Shared fixtures for registry and library tests

use std::cell::RefCell;
use std::rc::Rc;

use super::{
    AssemblyHandle, AssemblyStore, BindContext, BindError, EmbeddedSource, LoadError,
    PopulateContext, ReferenceToken, Registry, Resource, ResourceStream,
};

/// Ordered log of hook calls, installed as a registry service
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    /// Number of entries starting with `prefix`
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

/// Text resource that records its hooks and acquires its `dep:` lines on bind
#[derive(Default)]
pub(crate) struct Probe {
    pub(crate) text: String,
    path: String,
    journal: Option<Journal>,
    deps: Vec<String>,
    tokens: Vec<ReferenceToken<Probe>>,
}

impl Probe {
    pub(crate) fn dependencies(&self) -> usize {
        self.tokens.len()
    }

    fn record(&self, hook: &str) {
        if let Some(journal) = &self.journal {
            journal.record(format!("{hook}:{}", self.path));
        }
    }
}

impl Resource for Probe {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        let text = stream.read_text()?;
        if text.starts_with("bad") {
            return Err(LoadError::Decode("probe rejected content".to_string()));
        }

        self.path = ctx.identity().path().to_string();
        self.journal = ctx.service::<Journal>().cloned();
        self.deps = text
            .lines()
            .filter_map(|line| line.strip_prefix("dep:"))
            .map(str::to_string)
            .collect();
        self.text = text;
        self.record("populate");
        Ok(())
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        self.record("bind");

        for dep in &self.deps {
            let token = ctx.acquire::<Probe>(dep)?;
            self.tokens.push(token);
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.record("teardown");
        self.tokens.clear();
    }
}

/// A second kind, for mismatch checks
#[derive(Default)]
pub(crate) struct OtherProbe;

impl Resource for OtherProbe {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        _ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        stream.read_all()?;
        Ok(())
    }

    fn teardown(&mut self) {}
}

/// A registry with a journal service and a small assembly named `test`
pub(crate) fn fixture() -> (Registry, AssemblyHandle, Journal) {
    let journal = Journal::default();
    let registry = Registry::new().with_service(journal.clone());

    let source = EmbeddedSource::new()
        .with("tex/a.png", b"pixels")
        .with("tex/b.png", b"more pixels")
        .with("mat/m", b"material\ndep:tex/a.png")
        .with("mat/broken", b"material\ndep:tex/missing.png")
        .with("bad/blob", b"bad data")
        .with("cyc/x", b"dep:cyc/y")
        .with("cyc/y", b"dep:cyc/x");

    let mut store = AssemblyStore::new();
    let assembly = store
        .register("test", source)
        .expect("fresh store accepts the test assembly");

    (registry, assembly, journal)
}
