use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextChange {
    pub previous: Option<String>,
    pub current: Option<String>,
    pub revision: u64,
}

type Listener = Box<dyn FnMut(&ContextChange)>;

/// Currently selected class, shared by every handler through `AppState`.
/// All writes go through `select_class`, which notifies listeners.
#[derive(Default)]
pub struct AppContext {
    selected_class_id: Option<String>,
    revision: u64,
    listeners: Vec<Listener>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_class_id(&self) -> Option<&str> {
        self.selected_class_id.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&ContextChange) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Returns the change when the selection actually moved.
    pub fn select_class(&mut self, class_id: Option<String>) -> Option<ContextChange> {
        if self.selected_class_id == class_id {
            return None;
        }
        self.revision += 1;
        let change = ContextChange {
            previous: std::mem::replace(&mut self.selected_class_id, class_id),
            current: self.selected_class_id.clone(),
            revision: self.revision,
        };
        for listener in self.listeners.iter_mut() {
            listener(&change);
        }
        Some(change)
    }

    /// Clears the selection if it points at `class_id`.
    pub fn forget_class(&mut self, class_id: &str) -> Option<ContextChange> {
        if self.selected_class_id.as_deref() == Some(class_id) {
            self.select_class(None)
        } else {
            None
        }
    }

    pub fn reset(&mut self) -> Option<ContextChange> {
        self.select_class(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn select_notifies_only_on_change() {
        let seen: Rc<RefCell<Vec<ContextChange>>> = Rc::default();
        let mut ctx = AppContext::new();
        let sink = Rc::clone(&seen);
        ctx.subscribe(move |c| sink.borrow_mut().push(c.clone()));

        assert!(ctx.select_class(Some("c1".to_string())).is_some());
        assert!(ctx.select_class(Some("c1".to_string())).is_none());
        let change = ctx.select_class(Some("c2".to_string())).expect("change");
        assert_eq!(change.previous.as_deref(), Some("c1"));
        assert_eq!(change.current.as_deref(), Some("c2"));
        assert_eq!(change.revision, 2);
        assert_eq!(ctx.revision(), 2);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn forgetting_other_class_keeps_selection() {
        let mut ctx = AppContext::new();
        ctx.select_class(Some("c1".to_string()));
        assert!(ctx.forget_class("c2").is_none());
        assert_eq!(ctx.selected_class_id(), Some("c1"));
        let change = ctx.forget_class("c1").expect("cleared");
        assert_eq!(change.current, None);
        assert_eq!(ctx.selected_class_id(), None);
    }
}
