mod chart;
mod config;
mod gemini;
mod state;
mod telemetry;

use iced::{
    alignment, clipboard,
    event::{self, Event as IcedEvent},
    keyboard::{self, Key},
    time,
    widget::{button, column, container, row, scrollable, text, text_input},
    window, Element, Font, Length, Subscription, Task, Theme,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gemini::{AnalysisResult, GeminiClient};
use state::{RequestState, Screen};
use telemetry::SystemLog;

const FEED_PERIOD: Duration = Duration::from_secs(4);

fn main() -> iced::Result {
    let config = config::Config::load();

    iced::application("QUANTDESK", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: iced::Size::new(config.window.width as f32, config.window.height as f32),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(App::new)
}

#[derive(Debug, Clone)]
enum Message {
    ScreenSelected(Screen),
    DigestFetched(String),
    QuantInputChanged(String),
    QuantSubmit,
    QuantSettled(String),
    DealsInputChanged(String),
    DealsSubmit,
    DealsSettled(AnalysisResult),
    ResourceInputChanged(String),
    ResourceLatChanged(String),
    ResourceLngChanged(String),
    ResourceSubmit,
    ResourceSettled(AnalysisResult),
    ChartPathChanged(String),
    ChartDirectiveChanged(String),
    ChartSubmit,
    ChartSettled(String),
    FeedTick,
    SpinnerTick,
    CopyOutput,
    Exit,
}

struct App {
    screen: Screen,
    digest_text: Option<String>,
    digest_loading: bool,
    quant: RequestState<String>,
    deals: RequestState<AnalysisResult>,
    resources: RequestState<AnalysisResult>,
    resource_lat: String,
    resource_lng: String,
    chart: RequestState<String>,
    chart_directive: String,
    log: SystemLog,
    loading_frame: usize,
    client: Arc<GeminiClient>,
}

/// Both coordinates must parse for a location constraint to apply; anything
/// else means an unconstrained survey.
fn parse_location(lat: &str, lng: &str) -> Option<(f64, f64)> {
    let lat = lat.trim().parse::<f64>().ok()?;
    let lng = lng.trim().parse::<f64>().ok()?;
    Some((lat, lng))
}

impl App {
    fn new() -> (Self, Task<Message>) {
        let config = config::Config::load();
        let api_key = config::api_key();

        if api_key.is_empty() {
            eprintln!("Warning: GEMINI_API_KEY is not set; all requests will fail.");
        }

        let client = Arc::new(GeminiClient::new(config.api.host, api_key, config.models));

        let mut log = SystemLog::new();
        log.info("Terminal session started");
        log.info("Fetching market digest");

        let app = App {
            screen: Screen::Dashboard,
            digest_text: None,
            digest_loading: true,
            quant: RequestState::default(),
            deals: RequestState::default(),
            resources: RequestState::default(),
            resource_lat: String::new(),
            resource_lng: String::new(),
            chart: RequestState::default(),
            chart_directive: String::new(),
            log,
            loading_frame: 0,
            client: client.clone(),
        };

        let fetch = Task::future(async move {
            Message::DigestFetched(client.fetch_market_digest().await)
        });

        (app, fetch)
    }

    fn any_loading(&self) -> bool {
        self.digest_loading
            || self.quant.is_loading
            || self.deals.is_loading
            || self.resources.is_loading
            || self.chart.is_loading
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ScreenSelected(screen) => {
                // No cancellation: an in-flight request keeps running and
                // settles into its own (possibly hidden) slot.
                self.screen = screen;
                Task::none()
            }
            Message::DigestFetched(digest) => {
                self.digest_text = Some(digest);
                self.digest_loading = false;
                self.log.info("Market digest updated");
                Task::none()
            }
            Message::QuantInputChanged(value) => {
                self.quant.input = value;
                Task::none()
            }
            Message::QuantSubmit => match self.quant.submit() {
                Some(query) => {
                    self.log.info(format!("Running quant model on \"{}\"", query));
                    let client = self.client.clone();
                    Task::future(async move {
                        Message::QuantSettled(client.generate_quant_prediction(&query).await)
                    })
                }
                None => Task::none(),
            },
            Message::QuantSettled(prediction) => {
                self.quant.settle(prediction);
                self.log.info("Quant prediction settled");
                Task::none()
            }
            Message::DealsInputChanged(value) => {
                self.deals.input = value;
                Task::none()
            }
            Message::DealsSubmit => match self.deals.submit() {
                Some(sector) => {
                    self.log.info(format!("Scanning deal flow in {}", sector));
                    let client = self.client.clone();
                    Task::future(async move {
                        Message::DealsSettled(client.find_deals(&sector).await)
                    })
                }
                None => Task::none(),
            },
            Message::DealsSettled(result) => {
                self.deals.settle(result);
                self.log.info("Deal flow scan settled");
                Task::none()
            }
            Message::ResourceInputChanged(value) => {
                self.resources.input = value;
                Task::none()
            }
            Message::ResourceLatChanged(value) => {
                self.resource_lat = value;
                Task::none()
            }
            Message::ResourceLngChanged(value) => {
                self.resource_lng = value;
                Task::none()
            }
            Message::ResourceSubmit => match self.resources.submit() {
                Some(resource_type) => {
                    let location = parse_location(&self.resource_lat, &self.resource_lng);
                    match location {
                        Some((lat, lng)) => self.log.info(format!(
                            "Surveying {} near ({}, {})",
                            resource_type, lat, lng
                        )),
                        None => self
                            .log
                            .info(format!("Surveying {} worldwide", resource_type)),
                    }
                    let client = self.client.clone();
                    Task::future(async move {
                        Message::ResourceSettled(
                            client.find_resources(&resource_type, location).await,
                        )
                    })
                }
                None => Task::none(),
            },
            Message::ResourceSettled(result) => {
                self.resources.settle(result);
                self.log.info("Resource survey settled");
                Task::none()
            }
            Message::ChartPathChanged(value) => {
                self.chart.input = value;
                Task::none()
            }
            Message::ChartDirectiveChanged(value) => {
                self.chart_directive = value;
                Task::none()
            }
            Message::ChartSubmit => match self.chart.submit() {
                Some(path) => {
                    self.log.info(format!("Analyzing chart {}", path));
                    let directive = self.chart_directive.trim().to_string();
                    let client = self.client.clone();
                    Task::future(async move {
                        let directive = if directive.is_empty() {
                            None
                        } else {
                            Some(directive)
                        };
                        let payload = tokio::task::spawn_blocking(move || {
                            chart::encode_chart_base64(&PathBuf::from(path))
                        })
                        .await;
                        let settled = match payload {
                            Ok(Ok(encoded)) => {
                                client.analyze_image(&encoded, directive.as_deref()).await
                            }
                            Ok(Err(e)) => format!("[LOADER ERROR] {:#}", e),
                            Err(e) => format!("[LOADER ERROR] {}", e),
                        };
                        Message::ChartSettled(settled)
                    })
                }
                None => Task::none(),
            },
            Message::ChartSettled(analysis) => {
                self.chart.settle(analysis);
                self.log.info("Chart analysis settled");
                Task::none()
            }
            Message::FeedTick => {
                self.log.synthetic_tick();
                Task::none()
            }
            Message::SpinnerTick => {
                if self.any_loading() {
                    self.loading_frame = (self.loading_frame + 1) % 80;
                }
                Task::none()
            }
            Message::CopyOutput => match self.visible_output() {
                Some(output) => clipboard::write(output),
                None => Task::none(),
            },
            Message::Exit => iced::exit(),
        }
    }

    fn visible_output(&self) -> Option<String> {
        match self.screen {
            Screen::Dashboard => self.digest_text.clone(),
            Screen::Quant => self.quant.result.clone(),
            Screen::Deals => self.deals.result.as_ref().map(|r| r.text.clone()),
            Screen::Resources => self.resources.result.as_ref().map(|r| r.text.clone()),
            Screen::Chart => self.chart.result.clone(),
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let feed = time::every(FEED_PERIOD).map(|_| Message::FeedTick);

        let spinner = if self.any_loading() {
            time::every(Duration::from_millis(80)).map(|_| Message::SpinnerTick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Exit)
            } else {
                None
            }
        });

        Subscription::batch([feed, spinner, events])
    }

    fn loading_view(&self) -> Element<'_, Message> {
        let loading_frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        let loading_messages = [
            "Crunching order flow...",
            "Consulting the quant engine...",
            "Pinging the uplink...",
            "Weighing the scenarios...",
            "Scanning the tape...",
            "Recalibrating the models...",
            "Pulling the feed...",
            "Marking to market...",
        ];

        let message_idx = (self.loading_frame / 10) % loading_messages.len();
        let spinner_idx = self.loading_frame % loading_frames.len();

        container(
            column![
                text(loading_frames[spinner_idx]).size(32),
                text(loading_messages[message_idx]).size(15)
            ]
            .spacing(10)
            .align_x(alignment::Horizontal::Center),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .align_x(alignment::Horizontal::Center)
        .align_y(alignment::Vertical::Center)
        .into()
    }

    fn output_view<'a>(
        &'a self,
        output: Option<&'a str>,
        is_loading: bool,
    ) -> Element<'a, Message> {
        if is_loading {
            return self.loading_view();
        }
        let body = output.unwrap_or("Awaiting input.");
        scrollable(container(text(body).size(15)).padding(15).width(Length::Fill))
            .height(Length::Fill)
            .into()
    }

    fn analysis_view<'a>(
        &'a self,
        result: Option<&'a AnalysisResult>,
        is_loading: bool,
    ) -> Element<'a, Message> {
        if is_loading {
            return self.loading_view();
        }
        let Some(result) = result else {
            return self.output_view(None, false);
        };

        let mut body = column![text(result.text.as_str()).size(15)].spacing(10);

        if !result.citations.is_empty() {
            body = body.push(text("SOURCES").size(13));
            for citation in &result.citations {
                body =
                    body.push(text(format!("• {} — {}", citation.title, citation.uri)).size(13));
            }
        }

        scrollable(container(body).padding(15).width(Length::Fill))
            .height(Length::Fill)
            .into()
    }

    fn sidebar(&self) -> Element<'_, Message> {
        let mut bar = column![].spacing(5).width(Length::Fixed(220.0));
        for screen in Screen::ALL {
            let label = if screen == self.screen {
                format!("> {}", screen.label())
            } else {
                format!("  {}", screen.label())
            };
            bar = bar.push(
                button(text(label).size(14))
                    .on_press(Message::ScreenSelected(screen))
                    .width(Length::Fill)
                    .padding(8),
            );
        }
        bar.into()
    }

    fn feed_view(&self) -> Element<'_, Message> {
        let mut feed = column![text("SYSTEM LOG").size(13)].spacing(4);
        for entry in self.log.entries() {
            feed = feed.push(
                text(format!(
                    "{} [{}] {}",
                    entry.timestamp,
                    entry.level.label(),
                    entry.message
                ))
                .size(12),
            );
        }
        container(scrollable(feed).height(Length::Fill))
            .width(Length::Fixed(320.0))
            .padding(10)
            .into()
    }

    fn panel(&self) -> Element<'_, Message> {
        match self.screen {
            Screen::Dashboard => column![
                text("MARKET DIGEST").size(16),
                self.output_view(self.digest_text.as_deref(), self.digest_loading),
            ]
            .spacing(10)
            .into(),
            Screen::Quant => column![
                text_input("Query the quant engine...", &self.quant.input)
                    .on_input(Message::QuantInputChanged)
                    .on_submit(Message::QuantSubmit)
                    .padding(10)
                    .size(15),
                button(text("RUN MODEL").size(14))
                    .on_press_maybe((!self.quant.is_loading).then_some(Message::QuantSubmit))
                    .padding(8),
                self.output_view(self.quant.result.as_deref(), self.quant.is_loading),
            ]
            .spacing(10)
            .into(),
            Screen::Deals => column![
                text_input("Sector to scan...", &self.deals.input)
                    .on_input(Message::DealsInputChanged)
                    .on_submit(Message::DealsSubmit)
                    .padding(10)
                    .size(15),
                button(text("SCAN DEAL FLOW").size(14))
                    .on_press_maybe((!self.deals.is_loading).then_some(Message::DealsSubmit))
                    .padding(8),
                self.analysis_view(self.deals.result.as_ref(), self.deals.is_loading),
            ]
            .spacing(10)
            .into(),
            Screen::Resources => column![
                text_input("Resource type (e.g. lithium)...", &self.resources.input)
                    .on_input(Message::ResourceInputChanged)
                    .on_submit(Message::ResourceSubmit)
                    .padding(10)
                    .size(15),
                row![
                    text_input("Latitude (optional)", &self.resource_lat)
                        .on_input(Message::ResourceLatChanged)
                        .padding(10)
                        .size(15),
                    text_input("Longitude (optional)", &self.resource_lng)
                        .on_input(Message::ResourceLngChanged)
                        .padding(10)
                        .size(15),
                ]
                .spacing(10),
                button(text("SURVEY").size(14))
                    .on_press_maybe(
                        (!self.resources.is_loading).then_some(Message::ResourceSubmit)
                    )
                    .padding(8),
                self.analysis_view(self.resources.result.as_ref(), self.resources.is_loading),
            ]
            .spacing(10)
            .into(),
            Screen::Chart => column![
                text_input("Path to chart image...", &self.chart.input)
                    .on_input(Message::ChartPathChanged)
                    .on_submit(Message::ChartSubmit)
                    .padding(10)
                    .size(15),
                text_input("Directive (optional)...", &self.chart_directive)
                    .on_input(Message::ChartDirectiveChanged)
                    .padding(10)
                    .size(15),
                button(text("ANALYZE CHART").size(14))
                    .on_press_maybe((!self.chart.is_loading).then_some(Message::ChartSubmit))
                    .padding(8),
                self.output_view(self.chart.result.as_deref(), self.chart.is_loading),
            ]
            .spacing(10)
            .into(),
        }
    }

    fn view(&self) -> Element<'_, Message> {
        let mut main = column![self.panel()].spacing(10).padding(10);

        if self.visible_output().is_some() && !self.any_loading() {
            main = main.push(
                container(
                    button(text("[Copy]").size(14))
                        .on_press(Message::CopyOutput)
                        .padding(8),
                )
                .width(Length::Fill)
                .align_x(alignment::Horizontal::Right),
            );
        }

        row![
            container(self.sidebar()).padding(10),
            container(main).width(Length::Fill).height(Length::Fill),
            self.feed_view(),
        ]
        .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}
