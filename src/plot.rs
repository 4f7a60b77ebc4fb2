use crate::error::{HnnError, Result};
use plotters::prelude::*;
use std::path::Path;

/// 学習・テスト損失の推移を片対数グラフとしてPNGファイルに出力します。
///
/// 正の有限値だけを描画します。
pub fn plot_loss_history(path: &Path, train_hist: &[f32], test_hist: &[f32]) -> Result<()> {
    let to_points = |hist: &[f32]| -> Vec<(usize, f32)> {
        hist.iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite() && **v > 0.0)
            .map(|(i, v)| (i, v.log10()))
            .collect()
    };
    let train = to_points(train_hist);
    let test = to_points(test_hist);

    let (min_log, max_log) = train
        .iter()
        .chain(&test)
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &(_, v)| {
            (lo.min(v), hi.max(v))
        });
    if !min_log.is_finite() {
        return Err(HnnError::Plot("描画できる正の損失値がありません".into()));
    }
    let epochs = train_hist.len().max(test_hist.len()).max(2);

    draw(path, &train, &test, epochs, min_log - 0.5, max_log + 0.5)
        .map_err(|e| HnnError::Plot(e.to_string()))
}

fn draw(
    path: &Path,
    train: &[(usize, f32)],
    test: &[(usize, f32)],
    epochs: usize,
    min_log: f32,
    max_log: f32,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..epochs, min_log..max_log)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Epoch")
        .draw()?;
    chart
        .draw_series(LineSeries::new(train.iter().copied(), &RED))?
        .label("Training")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(test.iter().copied(), &BLUE))?
        .label("Test")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
