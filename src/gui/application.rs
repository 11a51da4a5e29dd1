use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, executor, window};
use iced::event::{self, Event};
use iced::time::every as iced_time_every;
use iced::theme::{self, Theme};
use iced::widget::{Column, container, horizontal_rule, text};
use std::time::{Duration, Instant};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::connection::connect_device_subscription;
use crate::display::dispatch;
use crate::error::AppRunError;
use crate::gui::model::DisplayModel;
use crate::gui::style::NoticeStyleSheet;
use crate::gui::types::Message;

pub struct ApplicationFlags {
    pub config: Config,
}

pub struct MyApplication {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,
    config: Config,
    display: DisplayModel,
    now: Instant,
}

impl MyApplication {
    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }
}

impl Application for MyApplication {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (MyApplication, Command<Self::Message>) {
        let app = MyApplication {
            app_cancel: CancellationToken::new(),
            display: DisplayModel::new(flags.config.stale_after()),
            config: flags.config,
            now: Instant::now(),
        };

        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from(concat!("VAN Charge Monitor ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();
                return window::close(id);
            },
            Message::Tick(now) => {
                self.now = now;
            },
            Message::DeviceEvent(event) => {
                self.now = Instant::now();
                dispatch(&mut self.display, &event);
            },
            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            event::listen().map(Message::EventOccurred),
            iced_time_every(Duration::from_secs(1)).map(Message::Tick),
            connect_device_subscription(
                self.app_cancel.clone(),
                self.config.target(),
                vec![],
            ).map(Message::DeviceEvent),
        ])
    }

    fn view(&self) -> Element<Message> {
        let mut content = Column::new()
            .spacing(20)
            .width(Length::Fill)
            .align_items(Alignment::Center)
            .push(text(format!("{} {}", self.config.device_name, self.display.device_state)))
            .push(horizontal_rule(10));

        match &self.display.reading {
            None => {
                content = content.push(text("Waiting for data…").size(20));
            },
            Some(reading) => {
                content = content.push(text(reading.payload.as_str()).size(28));

                if let Some(status) = &reading.status {
                    content = content.push(
                        Column::with_children(status.lines().into_iter().map(|line| Element::from(text(line))))
                            .spacing(6)
                    );
                }

                if let Some(label) = self.display.age_label(self.now) {
                    content = content.push(text(label).size(14));
                }
            },
        }

        if let Some(notice) = self.display.visible_notice(self.now) {
            content = content.push(
                container(text(notice.to_string()))
                    .padding(10)
                    .style(theme::Container::Custom(Box::new(NoticeStyleSheet)))
            );
        }

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(20)
            .into()
    }
}

pub fn run_application(config: Config) -> Result<(), AppRunError> {
    let flags = ApplicationFlags { config };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("van-charge-monitor".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(480.0, 520.0);

    // this function will call process::exit() unless there was a startup error
    MyApplication::run(settings)?;
    Ok(())
}
