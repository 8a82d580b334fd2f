//! Linked shader programs and their cache.

pub mod shader_lib;

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::batch::Vertex;
use crate::gl::{
    ActiveUniform, AttribLocation, AttribType, GlApi, ProgramError, ProgramId, VertexAttrib,
};

pub use shader_lib::ProgramSource;

/// A linked program with its attribute and uniform tables.
///
/// Tables are read once at link time; uniform sync walks `uniforms` in
/// declaration order.
#[derive(Debug)]
pub struct Program {
    pub id: ProgramId,
    attributes: Vec<(String, AttribLocation)>,
    uniforms: Vec<ActiveUniform>,
}

impl Program {
    pub fn link<G: GlApi>(gl: &mut G, vertex_src: &str, fragment_src: &str) -> Result<Self, ProgramError> {
        let id = gl.create_program(vertex_src, fragment_src)?;
        let attributes = gl
            .active_attributes(id)
            .into_iter()
            .map(|a| (a.name, a.location))
            .collect();
        let uniforms = gl.active_uniforms(id);
        Ok(Self { id, attributes, uniforms })
    }

    pub fn attribute(&self, name: &str) -> Option<AttribLocation> {
        self.attributes.iter().find(|(n, _)| n == name).map(|&(_, loc)| loc)
    }

    #[inline]
    pub fn uniforms(&self) -> &[ActiveUniform] {
        &self.uniforms
    }

    /// Points the known attributes at the interleaved [`Vertex`] layout.
    pub fn bind_attributes<G: GlApi>(&self, gl: &mut G) {
        for (name, location) in &self.attributes {
            let (components, ty, normalized, offset) = match name.as_str() {
                "aVertexPosition" => (2, AttribType::Float, false, Vertex::POSITION_OFFSET),
                "aTextureCoord" => (2, AttribType::Float, false, Vertex::UV_OFFSET),
                "aColor" => (4, AttribType::UnsignedByte, true, Vertex::COLOR_OFFSET),
                _ => continue,
            };
            gl.vertex_attrib_pointer(VertexAttrib {
                location: *location,
                components,
                ty,
                normalized,
                stride: Vertex::STRIDE,
                offset,
            });
            gl.enable_vertex_attrib_array(*location);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    name: String,
    vertex: u64,
    fragment: u64,
}

impl ProgramKey {
    fn new(src: &ProgramSource<'_>) -> Self {
        let hash = |s: &str| {
            let mut h = DefaultHasher::new();
            s.hash(&mut h);
            h.finish()
        };
        Self { name: src.key.to_string(), vertex: hash(src.vertex), fragment: hash(src.fragment) }
    }
}

/// Linked programs keyed by name and source.
///
/// Each distinct configuration is compiled at most once per GL context,
/// including failures: a program that did not link is not retried.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<ProgramKey, Rc<Program>>,
    failed: HashSet<ProgramKey>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn get_or_link<G: GlApi>(&mut self, gl: &mut G, src: &ProgramSource<'_>) -> Option<Rc<Program>> {
        let key = ProgramKey::new(src);
        if let Some(program) = self.programs.get(&key) {
            return Some(Rc::clone(program));
        }
        if self.failed.contains(&key) {
            return None;
        }

        match Program::link(gl, src.vertex, src.fragment) {
            Ok(program) => {
                log::debug!("linked program '{}' ({:?})", src.key, program.id);
                let program = Rc::new(program);
                self.programs.insert(key, Rc::clone(&program));
                Some(program)
            }
            Err(err) => {
                log::error!("program '{}': {err}", src.key);
                self.failed.insert(key);
                None
            }
        }
    }

    /// Deletes every program.
    pub fn delete_all<G: GlApi>(&mut self, gl: &mut G) {
        for (_, program) in self.programs.drain() {
            gl.delete_program(program.id);
        }
        self.failed.clear();
    }

    /// Forgets programs that died with a lost context.
    pub fn forget(&mut self) {
        self.programs.clear();
        self.failed.clear();
    }
}
