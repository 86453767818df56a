//! Scope arena: one frame per query block.

use crate::table::OutputColumn;
use quarry_core::DataType;
use std::collections::HashMap;

/// Index of a frame in the [`ScopeArena`].
pub type FrameId = usize;

/// What kind of source declares a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A schema method or coupled source.
    Table,
    /// A common table expression.
    Cte,
}

/// A source bound under an alias inside one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceBinding {
    pub alias: String,
    pub kind: SourceKind,
    pub columns: Vec<OutputColumn>,
    /// Position of the first column in the block's combined row.
    pub offset: usize,
}

/// A resolved column reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnBinding {
    pub name: String,
    /// Alias of the declaring source.
    pub alias: String,
    pub data_type: Option<DataType>,
    pub kind: SourceKind,
    /// Position in the block's combined row.
    pub index: usize,
}

/// Why a column reference failed to resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnLookupError {
    /// The qualifier names no source. Carries the visible aliases.
    UnknownAlias { aliases: Vec<String> },
    /// No source declares the column. Carries every visible column name.
    UnknownColumn { candidates: Vec<String> },
    /// Several sources declare the column. Carries their aliases.
    Ambiguous { aliases: Vec<String> },
}

/// The alias is already bound in the frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateAlias(pub String);

/// Shape of a materialized CTE.
#[derive(Clone, Debug, PartialEq)]
pub struct CteShape {
    pub name: String,
    pub columns: Vec<OutputColumn>,
}

/// Outcome of a CTE lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum CteLookup<'a> {
    Defined(&'a CteShape),
    /// Declared later in the same WITH clause.
    Forward,
    /// The CTE being defined refers to itself.
    SelfReference,
    Unknown,
}

#[derive(Debug, Default)]
struct Frame {
    parent: Option<FrameId>,
    sources: Vec<SourceBinding>,
    aliases: HashMap<String, usize>,
    /// CTE names of this frame's WITH clause in declaration order.
    declared: Vec<String>,
    /// CTEs defined so far, in declaration order.
    defined: Vec<CteShape>,
    /// Name of the CTE whose body this frame analyzes.
    defining: Option<String>,
}

/// Arena of scope frames linked to their parents.
#[derive(Debug)]
pub struct ScopeArena {
    frames: Vec<Frame>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    /// The root frame has id 0.
    pub const ROOT: FrameId = 0;

    /// Creates an arena holding only the root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    /// Adds a child frame.
    pub fn push_frame(&mut self, parent: FrameId) -> FrameId {
        self.frames.push(Frame {
            parent: Some(parent),
            ..Frame::default()
        });
        self.frames.len() - 1
    }

    /// Adds a frame analyzing the body of the CTE `name`.
    pub fn push_cte_frame(&mut self, parent: FrameId, name: &str) -> FrameId {
        let id = self.push_frame(parent);
        self.frames[id].defining = Some(name.to_string());
        id
    }

    pub fn parent(&self, frame: FrameId) -> Option<FrameId> {
        self.frames[frame].parent
    }

    /// Records the CTE names of a WITH clause before any body is analyzed.
    pub fn declare_ctes(&mut self, frame: FrameId, names: impl IntoIterator<Item = String>) {
        self.frames[frame].declared.extend(names);
    }

    /// Marks a CTE as defined.
    pub fn define_cte(&mut self, frame: FrameId, shape: CteShape) {
        self.frames[frame].defined.push(shape);
    }

    /// Finds a CTE visible from `frame`.
    pub fn lookup_cte(&self, frame: FrameId, name: &str) -> CteLookup<'_> {
        let mut defining: Option<&str> = None;
        let mut current = Some(frame);
        while let Some(id) = current {
            let f = &self.frames[id];
            if defining.is_none() {
                defining = f.defining.as_deref();
            }
            if let Some(shape) = f.defined.iter().find(|c| c.name == name) {
                return CteLookup::Defined(shape);
            }
            if f.declared.iter().any(|d| d == name) {
                return if defining == Some(name) {
                    CteLookup::SelfReference
                } else {
                    CteLookup::Forward
                };
            }
            current = f.parent;
        }
        CteLookup::Unknown
    }

    /// Names of every CTE defined and visible from `frame`.
    pub fn visible_ctes(&self, frame: FrameId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = Some(frame);
        while let Some(id) = current {
            names.extend(self.frames[id].defined.iter().map(|c| c.name.as_str()));
            current = self.frames[id].parent;
        }
        names
    }

    /// Binds a source and returns the offset of its first column. Fails when
    /// the alias is already bound in the frame.
    pub fn add_source(
        &mut self,
        frame: FrameId,
        alias: &str,
        kind: SourceKind,
        columns: Vec<OutputColumn>,
    ) -> Result<usize, DuplicateAlias> {
        let f = &mut self.frames[frame];
        if f.aliases.contains_key(alias) {
            return Err(DuplicateAlias(alias.to_string()));
        }
        let offset = f.sources.last().map_or(0, |s| s.offset + s.columns.len());
        f.aliases.insert(alias.to_string(), f.sources.len());
        f.sources.push(SourceBinding {
            alias: alias.to_string(),
            kind,
            columns,
            offset,
        });
        Ok(offset)
    }

    /// Sources of a frame in binding order.
    pub fn sources(&self, frame: FrameId) -> &[SourceBinding] {
        &self.frames[frame].sources
    }

    pub fn source(&self, frame: FrameId, alias: &str) -> Option<&SourceBinding> {
        let f = &self.frames[frame];
        f.aliases.get(alias).map(|&i| &f.sources[i])
    }

    /// Width of the frame's combined row.
    pub fn width(&self, frame: FrameId) -> usize {
        self.frames[frame]
            .sources
            .last()
            .map_or(0, |s| s.offset + s.columns.len())
    }

    /// Resolves a column reference inside one frame.
    ///
    /// Qualified references look in the named source only. Unqualified ones
    /// must be declared by exactly one source.
    pub fn resolve_column(
        &self,
        frame: FrameId,
        qualifier: Option<&str>,
        name: &str,
    ) -> Result<ColumnBinding, ColumnLookupError> {
        let f = &self.frames[frame];
        if let Some(qualifier) = qualifier {
            let Some(source) = self.source(frame, qualifier) else {
                return Err(ColumnLookupError::UnknownAlias {
                    aliases: f.sources.iter().map(|s| s.alias.clone()).collect(),
                });
            };
            return match source.columns.iter().position(|c| c.name == name) {
                Some(i) => Ok(binding(source, i)),
                None => Err(ColumnLookupError::UnknownColumn {
                    candidates: source.columns.iter().map(|c| c.name.clone()).collect(),
                }),
            };
        }

        let mut matches = f.sources.iter().filter_map(|s| {
            s.columns
                .iter()
                .position(|c| c.name == name)
                .map(|i| (s, i))
        });
        match (matches.next(), matches.next()) {
            (Some((source, i)), None) => Ok(binding(source, i)),
            (Some(first), Some(second)) => {
                let mut aliases = vec![first.0.alias.clone(), second.0.alias.clone()];
                aliases.extend(matches.map(|(s, _)| s.alias.clone()));
                Err(ColumnLookupError::Ambiguous { aliases })
            }
            (None, _) => Err(ColumnLookupError::UnknownColumn {
                candidates: f
                    .sources
                    .iter()
                    .flat_map(|s| s.columns.iter().map(|c| c.name.clone()))
                    .collect(),
            }),
        }
    }
}

fn binding(source: &SourceBinding, i: usize) -> ColumnBinding {
    let column = &source.columns[i];
    ColumnBinding {
        name: column.name.clone(),
        alias: source.alias.clone(),
        data_type: column.data_type,
        kind: source.kind,
        index: source.offset + i,
    }
}
