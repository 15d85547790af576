/// The five workspaces of the terminal. Fixed set; selection only changes
/// which panel is rendered, it never touches another screen's request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Quant,
    Deals,
    Resources,
    Chart,
}

impl Screen {
    pub const ALL: [Screen; 5] = [
        Screen::Dashboard,
        Screen::Quant,
        Screen::Deals,
        Screen::Resources,
        Screen::Chart,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Screen::Dashboard => "DASHBOARD",
            Screen::Quant => "QUANT PREDICTION",
            Screen::Deals => "DEAL SOURCING",
            Screen::Resources => "RESOURCE MAPPING",
            Screen::Chart => "CHART ANALYSIS",
        }
    }
}

/// Request state for one screen: the live input value, the last settled
/// result, and the in-flight flag. Mutated only through `submit` and
/// `settle`; `is_loading` is true strictly between the two.
#[derive(Debug)]
pub struct RequestState<T> {
    pub input: String,
    pub result: Option<T>,
    pub is_loading: bool,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        RequestState {
            input: String::new(),
            result: None,
            is_loading: false,
        }
    }
}

impl<T> RequestState<T> {
    /// Gate for a submit event. Returns the trimmed input to dispatch, or
    /// None when the input is empty/whitespace or a request is already in
    /// flight. None means nothing changed and nothing should be dispatched.
    pub fn submit(&mut self) -> Option<String> {
        let trimmed = self.input.trim();
        if trimmed.is_empty() || self.is_loading {
            return None;
        }
        self.is_loading = true;
        Some(trimmed.to_string())
    }

    pub fn settle(&mut self, value: T) {
        self.result = Some(value);
        self.is_loading = false;
    }
}
