/// Cursor and status text of the terminal front-end. The gallery content
/// itself lives in the session's view.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub selected: usize,
    row_count: usize,
    status_message: Option<String>,
}

impl AppState {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Keeps the cursor on a real row after the view grew or was cleared.
    pub fn sync_rows(&mut self, row_count: usize) {
        self.row_count = row_count;
        if row_count == 0 {
            self.selected = 0;
        } else if self.selected >= row_count {
            self.selected = row_count - 1;
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.row_count == 0 {
            return;
        }
        let len = self.row_count as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1);
        self.selected = next as usize;
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.row_count.saturating_sub(1);
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn clear_status_message(&mut self) {
        self.status_message = None;
    }
}
