//! Named egui widgets with per-widget visibility.
//!
//! The registry owns the widgets but not the frame: the host runs the egui
//! context and calls [`WidgetRegistry::render_all`] inside its frame.

use std::collections::BTreeMap;

/// Something that can draw itself into an egui window.
pub trait Widget: Send {
    /// Per-frame state update, called for every widget, visible or not.
    fn update(&mut self) {}

    fn render(&mut self, ui: &mut egui::Ui);
}

struct Entry {
    widget: Box<dyn Widget>,
    visible: bool,
}

/// Widgets keyed by name, rendered in name order.
#[derive(Default)]
pub struct WidgetRegistry {
    widgets: BTreeMap<String, Entry>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a visible widget, replacing any widget with the same name.
    pub fn insert(&mut self, name: impl Into<String>, widget: Box<dyn Widget>) -> Option<Box<dyn Widget>> {
        let name = name.into();
        log::debug!("Registering widget '{}'", name);
        self.widgets
            .insert(
                name,
                Entry {
                    widget,
                    visible: true,
                },
            )
            .map(|entry| entry.widget)
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Widget>> {
        self.widgets.remove(name).map(|entry| entry.widget)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Widget> {
        self.widgets.get(name).map(|entry| entry.widget.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Widget + 'static)> {
        self.widgets.get_mut(name).map(|entry| entry.widget.as_mut())
    }

    /// Show or hide a widget. Returns `false` if no widget has that name.
    pub fn set_visible(&mut self, name: &str, visible: bool) -> bool {
        match self.widgets.get_mut(name) {
            Some(entry) => {
                entry.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.widgets.get(name).is_some_and(|entry| entry.visible)
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.widgets.keys().map(String::as_str)
    }

    pub fn update_all(&mut self) {
        for entry in self.widgets.values_mut() {
            entry.widget.update();
        }
    }

    /// Draw every visible widget in a window titled with its name.
    pub fn render_all(&mut self, ctx: &egui::Context) {
        for (name, entry) in self.widgets.iter_mut() {
            if !entry.visible {
                continue;
            }
            egui::Window::new(name.as_str()).show(ctx, |ui| entry.widget.render(ui));
        }
    }
}
