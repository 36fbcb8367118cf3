use std::collections::HashMap;

use serde::Serialize;
pub use web_time::Instant;

use formwork_core::{FiberId, HookKind, Registry, SerializeContext};

/// Cost of one render-and-serialize pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RenderMetrics {
    pub payload_bytes: usize,
    pub segments: usize,
    pub callbacks: usize,
    pub elapsed_ms: f32,
}

impl RenderMetrics {
    pub fn measure(started: Instant, cx: &SerializeContext) -> Self {
        Self {
            payload_bytes: cx.total_bytes(),
            segments: cx.segments().len(),
            callbacks: cx.button_count(),
            elapsed_ms: started.elapsed().as_secs_f32() * 1000.0,
        }
    }
}

/// Per-fiber render counters, smoothed the same way for every fiber.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Hud {
    pub renders: u64,
    pub avg_ms: f32,
    pub latest: RenderMetrics,
}

impl Hud {
    fn record(&mut self, m: RenderMetrics) {
        self.renders += 1;
        // simple EMA
        let a = 0.2;
        self.avg_ms = if self.renders == 1 {
            m.elapsed_ms
        } else {
            (1.0 - a) * self.avg_ms + a * m.elapsed_ms
        };
        self.latest = m;
    }
}

#[derive(Debug, Serialize)]
struct FiberReport<'a> {
    id: String,
    component: &'static str,
    hooks: Vec<String>,
    mounted: bool,
    dirty: bool,
    awaiting: bool,
    pending_render: bool,
    suspended: Option<bool>,
    children: usize,
    last_render_tick: u64,
    metrics: Option<&'a Hud>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    total_renders: u64,
    fibers: Vec<FiberReport<'a>>,
}

pub struct Inspector {
    pub enabled: bool,
    total_renders: u64,
    fibers: HashMap<FiberId, Hud>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            enabled: false,
            total_renders: 0,
            fibers: HashMap::new(),
        }
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn record_render(&mut self, id: &FiberId, metrics: RenderMetrics) {
        if !self.enabled {
            return;
        }
        self.total_renders += 1;
        log::trace!(
            "{id}: {} bytes in {} segments, {:.2} ms",
            metrics.payload_bytes,
            metrics.segments,
            metrics.elapsed_ms
        );
        self.fibers.entry(id.clone()).or_default().record(metrics);
    }

    pub fn forget(&mut self, id: &FiberId) {
        self.fibers.remove(id);
    }

    pub fn metrics(&self, id: &FiberId) -> Option<&Hud> {
        self.fibers.get(id)
    }

    pub fn total_renders(&self) -> u64 {
        self.total_renders
    }

    /// One status line per tracked fiber.
    pub fn lines(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.fibers.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| {
                let h = &self.fibers[id];
                format!(
                    "{id}  |  renders: {}  |  bytes: {}  |  avg: {:.2} ms",
                    h.renders, h.latest.payload_bytes, h.avg_ms
                )
            })
            .collect()
    }

    /// Registry state joined with recorded metrics, as pretty JSON.
    pub fn snapshot_json(&self, registry: &Registry) -> serde_json::Result<String> {
        let fibers = registry
            .snapshot()
            .into_iter()
            .map(|s| FiberReport {
                id: s.id.to_string(),
                component: s.component,
                hooks: s.hooks.iter().map(HookKind::to_string).collect(),
                mounted: s.flags.mounted,
                dirty: s.flags.dirty,
                awaiting: s.flags.awaiting,
                pending_render: s.pending_render,
                suspended: s.suspended,
                children: s.children,
                last_render_tick: s.last_render_tick,
                metrics: self.fibers.get(&s.id),
            })
            .collect();
        serde_json::to_string_pretty(&Report {
            total_renders: self.total_renders,
            fibers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formwork_core::*;
    use std::rc::Rc;

    fn metrics(bytes: usize, ms: f32) -> RenderMetrics {
        RenderMetrics {
            payload_bytes: bytes,
            segments: 1,
            callbacks: 0,
            elapsed_ms: ms,
        }
    }

    #[test]
    fn disabled_inspector_records_nothing() {
        let mut inspector = Inspector::new();
        let id = FiberId::new("alex", "menu");
        inspector.record_render(&id, metrics(10, 1.0));
        assert_eq!(inspector.total_renders(), 0);
        assert!(inspector.metrics(&id).is_none());
    }

    #[test]
    fn averages_and_lines() {
        let mut inspector = Inspector::new();
        inspector.toggle();
        let id = FiberId::new("alex", "menu");
        inspector.record_render(&id, metrics(10, 1.0));
        inspector.record_render(&id, metrics(20, 2.0));

        let hud = inspector.metrics(&id).unwrap();
        assert_eq!(hud.renders, 2);
        assert!((hud.avg_ms - 1.2).abs() < 1e-5);
        assert_eq!(hud.latest.payload_bytes, 20);
        assert_eq!(
            inspector.lines(),
            vec!["alex:menu  |  renders: 2  |  bytes: 20  |  avg: 1.20 ms".to_string()]
        );
    }

    #[test]
    fn measure_reads_serialize_context() {
        let view = View::new(ViewKind::Button {
            label: "Go".into(),
            on_press: None,
        });
        let mut cx = SerializeContext::new();
        view.serialize(&mut cx).unwrap();
        let m = RenderMetrics::measure(Instant::now(), &cx);
        assert_eq!(m.segments, 1);
        assert_eq!(m.callbacks, 1);
        assert_eq!(m.payload_bytes, cx.segments()[0].payload.len());
    }

    #[test]
    fn snapshot_joins_registry_and_metrics() {
        let registry = Registry::new(Rc::new(ManualTicks::new()));
        let comp = Component::new("Menu", |_: &()| {
            use_state(|| 1);
            View::new(ViewKind::Panel)
        });
        let id = FiberId::new("alex", "menu");
        registry.get_or_create(&id, &comp, ());
        registry.render(&id).unwrap();

        let mut inspector = Inspector::new();
        inspector.enabled = true;
        inspector.record_render(&id, metrics(64, 0.5));

        let json: serde_json::Value =
            serde_json::from_str(&inspector.snapshot_json(&registry).unwrap()).unwrap();
        assert_eq!(json["total_renders"], 1);
        let fiber = &json["fibers"][0];
        assert_eq!(fiber["id"], "alex:menu");
        assert_eq!(fiber["component"], "Menu");
        assert_eq!(fiber["hooks"], serde_json::json!(["state"]));
        assert_eq!(fiber["metrics"]["latest"]["payload_bytes"], 64);
    }
}
