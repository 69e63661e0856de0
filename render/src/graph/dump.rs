//! Debug dumps of a graph: a plain-text report and a graphviz `.dot`
//! rendering of the pass/resource topology.

use super::resource::RdgResourceKind;
use super::RenderGraph;
use std::io::{self, Write};

impl RenderGraph {
    /// Pass indices in execution order when compiled, declaration order
    /// otherwise.
    fn dump_order(&self) -> Vec<usize> {
        if self.execution_order.is_empty() {
            (0..self.passes.len()).collect()
        } else {
            self.execution_order.clone()
        }
    }

    /// Writes a human-readable report of resources, passes, and (after
    /// compile) the per-pass transition tables.
    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "--- RESOURCES ---")?;
        for (i, r) in self.resources.iter().enumerate() {
            match &r.kind {
                RdgResourceKind::Image { info } => {
                    let extent = info.size.resolve(self.back_buffer_extent);
                    writeln!(w, "Image {}(#{})", r.tag, i)?;
                    writeln!(w, "  width ............ {}", extent.width)?;
                    writeln!(w, "  height ........... {}", extent.height)?;
                    writeln!(w, "  format ........... {:?}", info.format)?;
                    writeln!(w, "  samples .......... {}", info.samples)?;
                    writeln!(w, "  levels ........... {}", info.levels)?;
                    if let Some(&usage) = self.state.total_image_usage.get(&i) {
                        writeln!(w, "  usage ............ {:?}", usage)?;
                    }
                }
                RdgResourceKind::Buffer { info } => {
                    writeln!(w, "Buffer {}(#{})", r.tag, i)?;
                    writeln!(w, "  size ............. {}", info.size)?;
                    if let Some(&usage) = self.state.total_buffer_usage.get(&i) {
                        writeln!(w, "  usage ............ {:?}", usage)?;
                    }
                }
            }
            writeln!(w)?;
        }

        writeln!(w, "--- PASSES ---")?;
        for pass_index in self.dump_order() {
            let pass = &self.passes[pass_index];
            writeln!(w, "{} (#{})", pass.tag, pass_index)?;
        }
        writeln!(w)?;

        writeln!(w, "--- TRANSITIONS ---")?;
        for pass_index in self.dump_order() {
            let pass = &self.passes[pass_index];
            let mut entries: Vec<_> = self
                .state
                .image_transitions
                .iter()
                .filter(|((p, _), _)| *p == pass_index)
                .map(|((_, res), t)| (*res, "image", format!("{:?} -> {:?}", t.src, t.dst)))
                .chain(
                    self.state
                        .buffer_transitions
                        .iter()
                        .filter(|((p, _), _)| *p == pass_index)
                        .map(|((_, res), t)| {
                            (*res, "buffer", format!("{:?} -> {:?}", t.src, t.dst))
                        }),
                )
                .collect();
            entries.sort_by_key(|&(res, _, _)| res);
            for (res, kind, transition) in entries {
                writeln!(
                    w,
                    "{} {} {} .... {}",
                    pass.tag, kind, self.resources[res].tag, transition
                )?;
            }
        }
        Ok(())
    }

    /// Writes the topology as a graphviz digraph: one node per pass, one
    /// edge per producer-to-consumer resource flow.
    pub fn dump_graphviz<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "digraph frame {{")?;
        writeln!(w, "  rankdir=LR;")?;
        writeln!(w, "  node [shape=box, fontname=\"monospace\"];")?;

        for (order, pass_index) in self.dump_order().into_iter().enumerate() {
            let pass = &self.passes[pass_index];
            writeln!(w, "  p{} [label=\"{} ({})\"];", pass_index, pass.tag, order)?;
        }

        for resource in &self.resources {
            for &writer in &resource.written_in {
                for &reader in &resource.read_in {
                    if reader == writer {
                        continue;
                    }
                    writeln!(
                        w,
                        "  p{} -> p{} [label=\"{}\"];",
                        writer, reader, resource.tag
                    )?;
                }
            }
        }
        writeln!(w, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{QueueFlags, RdgImageInfo, RenderGraph};
    use crate::texture::TextureUsage;
    use crate::Format;

    fn two_pass_graph() -> RenderGraph {
        let mut graph = RenderGraph::new();
        graph.set_back_buffer_size(640, 480);
        graph
            .add_pass("draw", QueueFlags::GRAPHICS)
            .write_color_image(
                "color",
                RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
            );
        graph
            .add_pass("post", QueueFlags::GRAPHICS)
            .read_image("color", TextureUsage::SAMPLED)
            .write_color_image(
                "backbuffer",
                RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
            );
        graph.set_back_buffer_tag("backbuffer");
        graph
    }

    #[test]
    fn dump_lists_resources_and_passes() {
        let graph = two_pass_graph();
        let mut out = Vec::new();
        graph.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Image color"));
        assert!(text.contains("Image backbuffer"));
        assert!(text.contains("--- PASSES ---"));
        assert!(text.contains("draw (#0)"));
    }

    #[test]
    fn graphviz_contains_the_dependency_edge() {
        let graph = two_pass_graph();
        let mut out = Vec::new();
        graph.dump_graphviz(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph frame {"));
        assert!(text.contains("p0 -> p1 [label=\"color\"];"));
    }
}
