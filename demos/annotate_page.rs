use measure_hider::{
    BarLineDetector, DetectConfig, Practice,
    overlay::{draw_measures, draw_staff_groups},
    page::PageImage,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load a rendered score page
    let mut args = std::env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "assets/page.png".to_string());
    let output = args.next().unwrap_or_else(|| "assets/page_measures.png".to_string());
    println!("Loading page from {}...", input);
    let page = PageImage::decode(&std::fs::read(&input)?)?;

    // 2. Inspect the staff rows the detector sees
    let detector = BarLineDetector::try_new(DetectConfig::default())?;
    let groups = detector.staff_groups(page.image());
    for (i, group) in groups.iter().enumerate() {
        println!("Row {}: {} bar lines at y={}", i, group.bars.len(), group.y());
    }
    let rows_path = output.replace(".png", "_rows.png");
    draw_staff_groups(page.image(), &groups).save(&rows_path)?;
    println!("Saved {}", rows_path);

    // 3. Detect measures and pretend the first half has been played
    let mut practice = Practice::default();
    practice.load_pages([page.clone()]);
    practice.analyze_page(0, &detector)?;
    let count = practice.measures(0).len();
    println!("Found {} measures", count);

    if count > 0 {
        practice.click(0, 0)?;
        practice.toggle_play()?;
        let beats = practice.session().settings().beats_per_measure as usize;
        for _ in 0..(count / 2) * beats {
            practice.tick();
        }
    }

    let annotated = draw_measures(page.image(), practice.measures(0), |index| {
        practice.is_played(0, index)
    });
    annotated.save(&output)?;
    println!("Saved {}", output);

    Ok(())
}
