use iced::{Background, Border, Color, Shadow, Theme};
use iced::widget::container::{StyleSheet, Appearance};

pub struct NoticeStyleSheet;

impl StyleSheet for NoticeStyleSheet {
    type Style = Theme;

    fn appearance(&self, _style: &Self::Style) -> Appearance {
        Appearance {
            text_color: Some(Color::WHITE),
            background: Some(Background::Color(Color::from_rgba(0.0, 0.0, 0.0, 0.75))),
            border: Border {
                color: Color::TRANSPARENT,
                width: 0.0,
                radius: 6.0.into(),
            },
            shadow: Shadow::default(),
        }
    }
}
