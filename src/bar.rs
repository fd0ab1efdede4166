use indicatif::{ProgressBar, ProgressStyle};

pub fn get_progress_bar(len: u64, message: &str, template: Option<&str>) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        template.unwrap_or("{msg}: {wide_bar} ({pos}/{len}) [{elapsed_precise}]"),
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(message.to_owned());
    bar
}
