use tokio::sync::watch;
use tracing::debug;

use super::prompt::EditorNode;

/// The prompt editor's live document.
pub struct EditorBuffer {
    tx: watch::Sender<EditorNode>,
}

impl EditorBuffer {
    pub fn new(initial: EditorNode) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn content(&self) -> EditorNode {
        self.tx.borrow().clone()
    }

    /// Replaces the document unless its serialized form is identical to the
    /// current one. Returns whether the editor was mutated.
    pub fn replace_if_changed(&self, next: &EditorNode) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if same_document(current, next) {
                return false;
            }
            *current = next.clone();
            true
        });
        if !changed {
            debug!("Skipping editor update, content unchanged");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<EditorNode> {
        self.tx.subscribe()
    }
}

impl Default for EditorBuffer {
    fn default() -> Self {
        Self::new(EditorNode::empty_doc())
    }
}

fn same_document(a: &EditorNode, b: &EditorNode) -> bool {
    match (serde_json::to_string(a), serde_json::to_string(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
