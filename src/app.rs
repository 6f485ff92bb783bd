use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use speedprobe::settings::{Settings, SettingsField};
use speedprobe::speedtest::{MeasurementState, TestPhase};
use std::time::Duration;

const PING_COUNT_RANGE: (usize, usize) = (1, 50);
const DOWNLOAD_MIB_RANGE: (u64, u64) = (5, 500);
const UPLOAD_MIB_RANGE: (u64, u64) = (5, 250);
const SIZE_STEP_MIB: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Download,
    Upload,
    Ping,
}

impl Panel {
    pub fn next(self) -> Self {
        match self {
            Panel::Download => Panel::Upload,
            Panel::Upload => Panel::Ping,
            Panel::Ping => Panel::Download,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Download => Panel::Ping,
            Panel::Upload => Panel::Download,
            Panel::Ping => Panel::Upload,
        }
    }
}

pub struct App {
    /// Latest snapshot published by the controller.
    pub state: MeasurementState,
    pub should_quit: bool,

    // UI state
    pub view: AppView,
    pub selected_panel: Panel,
    pub expanded: bool,

    // Applied to the controller when the next run starts
    pub settings: Settings,
    pub selected_setting: SettingsField,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: MeasurementState::default(),
            should_quit: false,
            view: AppView::Main,
            selected_panel: Panel::Download,
            expanded: false,
            settings,
            selected_setting: SettingsField::PingCount,
        }
    }

    pub fn phase(&self) -> TestPhase {
        self.state.phase
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match self.view {
            AppView::Main => self.handle_main_key(key),
            AppView::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_main_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        let running = self.state.is_running();

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Char('s') => {
                if !running {
                    self.view = AppView::Settings;
                }
                None
            }
            KeyCode::Char('r') => {
                if !running && !self.state.results.is_empty() {
                    Some(AppAction::Reset)
                } else {
                    None
                }
            }
            KeyCode::Enter => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if !running {
                    Some(AppAction::StartTest)
                } else {
                    self.expanded = true;
                    None
                }
            }
            KeyCode::Esc => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if running {
                    Some(AppAction::CancelTest)
                } else {
                    None
                }
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.next();
                }
                None
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.prev();
                }
                None
            }
            KeyCode::Char(' ') => {
                self.expanded = !self.expanded;
                None
            }
            _ => None,
        }
    }

    fn handle_settings_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => {
                self.view = AppView::Main;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_setting = self.selected_setting.prev();
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected_setting = self.selected_setting.next();
            }
            KeyCode::Left | KeyCode::Char('h') => self.decrease_setting(),
            KeyCode::Right | KeyCode::Char('l') => self.increase_setting(),
            _ => {}
        }
        None
    }

    fn increase_setting(&mut self) {
        let s = &mut self.settings;
        match self.selected_setting {
            SettingsField::PingCount => {
                s.ping_count = (s.ping_count + 1).min(PING_COUNT_RANGE.1);
            }
            SettingsField::DownloadSize => {
                s.download_size_mib = (s.download_size_mib + SIZE_STEP_MIB).min(DOWNLOAD_MIB_RANGE.1);
            }
            SettingsField::UploadSize => {
                s.upload_size_mib = (s.upload_size_mib + SIZE_STEP_MIB).min(UPLOAD_MIB_RANGE.1);
            }
        }
    }

    fn decrease_setting(&mut self) {
        let s = &mut self.settings;
        match self.selected_setting {
            SettingsField::PingCount => {
                s.ping_count = s.ping_count.saturating_sub(1).max(PING_COUNT_RANGE.0);
            }
            SettingsField::DownloadSize => {
                s.download_size_mib = s
                    .download_size_mib
                    .saturating_sub(SIZE_STEP_MIB)
                    .max(DOWNLOAD_MIB_RANGE.0);
            }
            SettingsField::UploadSize => {
                s.upload_size_mib = s
                    .upload_size_mib
                    .saturating_sub(SIZE_STEP_MIB)
                    .max(UPLOAD_MIB_RANGE.0);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
    Reset,
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, KeyModifiers};

    fn press(app: &mut App, code: KeyCode) -> Option<AppAction> {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn enter_starts_when_idle_and_expands_while_running() {
        let mut app = App::new(Settings::default());
        assert_eq!(press(&mut app, KeyCode::Enter), Some(AppAction::StartTest));

        app.state.phase = TestPhase::Download;
        assert_eq!(press(&mut app, KeyCode::Enter), None);
        assert!(app.expanded);
    }

    #[test]
    fn escape_cancels_only_a_running_test() {
        let mut app = App::new(Settings::default());
        assert_eq!(press(&mut app, KeyCode::Esc), None);

        app.state.phase = TestPhase::Ping;
        assert_eq!(press(&mut app, KeyCode::Esc), Some(AppAction::CancelTest));
    }

    #[test]
    fn reset_needs_results() {
        let mut app = App::new(Settings::default());
        assert_eq!(press(&mut app, KeyCode::Char('r')), None);

        app.state.results.ping_ms = Some(20.0);
        assert_eq!(press(&mut app, KeyCode::Char('r')), Some(AppAction::Reset));
    }

    #[test]
    fn settings_are_clamped() {
        let mut app = App::new(Settings::default());
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(app.view, AppView::Settings);

        for _ in 0..10 {
            press(&mut app, KeyCode::Left);
        }
        assert_eq!(app.settings.ping_count, 1);

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.settings.download_size_mib, 15);

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.view, AppView::Main);
    }

    #[test]
    fn settings_locked_while_running() {
        let mut app = App::new(Settings::default());
        app.state.phase = TestPhase::Upload;
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(app.view, AppView::Main);
    }
}
