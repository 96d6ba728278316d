use std::path::PathBuf;

use image::Luma;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use track_cli::{ImageSequence, Pipeline};
use track_core::{
    DescriptorKind, DetectorKind, GrayImage, MatcherConfig, Region, SelectorKind, TrackError,
    TrackingConfig,
};
use track_detect::{create_detector, filter::filter_to_region};
use track_match::Matcher;

/// Grid of isolated squares with varying brightness, shifted left by `shift` pixels
fn squares(width: u32, height: u32, shift: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let x = x + shift;
        if (5..15).contains(&(x % 20)) && (5..15).contains(&(y % 20)) {
            Luma([(120 + ((x / 20) * 20 + (y / 20) * 10) % 130) as u8])
        } else {
            Luma([30])
        }
    })
}

/// Squares with per-cell random brightness, so every corner neighbourhood looks different
fn textured(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cells: Vec<u8> = (0..(width / 20 + 1) * (height / 20 + 1))
        .map(|_| rng.gen_range(90..=250))
        .collect();
    let stride = width / 20 + 1;
    GrayImage::from_fn(width, height, |x, y| {
        if (5..15).contains(&(x % 20)) && (5..15).contains(&(y % 20)) {
            Luma([cells[((y / 20) * stride + x / 20) as usize]])
        } else {
            Luma([20])
        }
    })
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("track-cli-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn identical_frames_match_at_zero_distance() {
    let config = TrackingConfig::new(DetectorKind::Fast, DescriptorKind::Brief);
    let mut pipeline = Pipeline::new(config).unwrap();
    let img = textured(160, 120, 11);

    pipeline.process_image(img.clone()).unwrap();
    let stats = pipeline.process_image(img).unwrap();

    let previous = pipeline.buffer().previous().unwrap();
    let current = pipeline.buffer().current().unwrap();
    assert!(!current.keypoints.is_empty());
    assert_eq!(previous.keypoints, current.keypoints);
    let smaller = previous.keypoints.len().min(current.keypoints.len());
    assert_eq!(current.matches.len(), smaller);
    assert_eq!(stats.matches, Some(smaller));
    for (i, m) in current.matches.iter().enumerate() {
        assert_eq!(m.query_idx, i);
        assert_eq!(m.distance, 0.0);
        assert!(m.train_idx < current.keypoints.len());
    }
}

#[test]
fn shi_tomasi_limit_keeps_detector_order_prefix() {
    let img = squares(240, 180, 0);
    let detected = create_detector(DetectorKind::ShiTomasi).detect(&img);
    assert!(detected.len() >= 50, "only {} corners", detected.len());
    assert!(detected.iter().all(|kp| kp.response.is_none()));

    let config = TrackingConfig::new(DetectorKind::ShiTomasi, DescriptorKind::Brisk)
        .with_keypoint_limit(50);
    let mut pipeline = Pipeline::new(config).unwrap();
    let stats = pipeline.process_image(img).unwrap();

    assert_eq!(stats.detected, detected.len());
    assert_eq!(stats.kept, 50);
    assert_eq!(stats.descriptors, 50);
    let current = pipeline.buffer().current().unwrap();
    assert_eq!(current.keypoints.as_slice(), &detected[..50]);
}

#[test]
fn region_filter_keeps_exactly_the_inside_subset() {
    let img = squares(800, 400, 0);
    let region = Region::new(535.0, 180.0, 180.0, 150.0);
    let detected = create_detector(DetectorKind::Fast).detect(&img);
    let inside = filter_to_region(detected.clone(), &region);
    assert!(!inside.is_empty());
    assert!(inside.len() < detected.len());

    let config = TrackingConfig::new(DetectorKind::Fast, DescriptorKind::Orb).with_region(region);
    let mut pipeline = Pipeline::new(config).unwrap();
    let stats = pipeline.process_image(img).unwrap();

    assert_eq!(stats.detected, detected.len());
    assert_eq!(stats.kept, inside.len());
    let current = pipeline.buffer().current().unwrap();
    assert_eq!(current.keypoints, inside);
    assert!(current.keypoints.iter().all(|kp| region.contains(kp.x, kp.y)));
}

#[test]
fn cross_checked_sift_matches_are_mutual() {
    let config = TrackingConfig::new(DetectorKind::Fast, DescriptorKind::Sift)
        .with_matcher(MatcherConfig::cross_checked());
    assert_eq!(config.matcher.selector, SelectorKind::NearestNeighbor);
    let mut pipeline = Pipeline::new(config).unwrap();

    pipeline.process_image(squares(160, 120, 0)).unwrap();
    let stats = pipeline.process_image(squares(160, 120, 2)).unwrap();
    assert!(stats.matches.unwrap() > 0);

    let previous = pipeline.buffer().previous().unwrap();
    let current = pipeline.buffer().current().unwrap();
    let reverse = pipeline
        .matcher()
        .match_frames(
            &current.keypoints,
            &previous.keypoints,
            current.descriptors().unwrap(),
            previous.descriptors().unwrap(),
        )
        .unwrap();

    let mut forward: Vec<(usize, usize)> =
        current.matches.iter().map(|m| (m.query_idx, m.train_idx)).collect();
    let mut backward: Vec<(usize, usize)> =
        reverse.iter().map(|m| (m.train_idx, m.query_idx)).collect();
    forward.sort_unstable();
    backward.sort_unstable();
    assert_eq!(forward, backward);
}

#[test]
fn ratio_test_matches_are_a_subset_of_nearest_neighbours() {
    let knn = TrackingConfig::new(DetectorKind::Fast, DescriptorKind::Orb)
        .with_matcher(MatcherConfig::k_nearest(2));
    let nn = TrackingConfig::new(DetectorKind::Fast, DescriptorKind::Orb);

    let mut filtered = Pipeline::new(knn).unwrap();
    let mut plain = Pipeline::new(nn).unwrap();
    for seed in [1, 2] {
        filtered.process_image(textured(160, 120, seed)).unwrap();
        plain.process_image(textured(160, 120, seed)).unwrap();
    }
    let filtered = &filtered.buffer().current().unwrap().matches;
    let plain = &plain.buffer().current().unwrap().matches;
    assert!(filtered.len() <= plain.len());
    for m in filtered {
        assert_eq!(plain[m.query_idx], *m);
    }
}

#[test]
fn matching_before_second_frame_is_underflow() {
    let mut pipeline = Pipeline::new(TrackingConfig::default()).unwrap();
    assert!(matches!(
        pipeline.match_latest(),
        Err(TrackError::InsufficientFrames { available: 0 })
    ));

    let stats = pipeline.process_image(squares(120, 90, 0)).unwrap();
    assert_eq!(stats.matches, None);
    assert!(matches!(
        pipeline.match_latest(),
        Err(TrackError::InsufficientFrames { available: 1 })
    ));
    assert!(pipeline.buffer().current().unwrap().matches.is_empty());
}

#[test]
fn every_pairing_runs_end_to_end() {
    let pairings = [
        (DetectorKind::Akaze, DescriptorKind::Akaze),
        (DetectorKind::Brisk, DescriptorKind::Brisk),
        (DetectorKind::Harris, DescriptorKind::Freak),
        (DetectorKind::Orb, DescriptorKind::Orb),
        (DetectorKind::ShiTomasi, DescriptorKind::Brief),
        (DetectorKind::Sift, DescriptorKind::Sift),
        (DetectorKind::Surf, DescriptorKind::Surf),
    ];
    for (detector, descriptor) in pairings {
        let mut pipeline = Pipeline::new(TrackingConfig::new(detector, descriptor)).unwrap();
        for shift in [0, 1] {
            let stats = pipeline.process_image(squares(160, 120, shift)).unwrap();
            assert_eq!(stats.descriptors, stats.kept, "{} + {}", detector, descriptor);
        }
        let current = pipeline.buffer().current().unwrap();
        assert!(current.matches.len() <= pipeline.buffer().previous().unwrap().keypoints.len());
    }
}

#[test]
fn sequence_run_processes_files_in_order() {
    let dir = temp_dir("sequence");
    for i in 0..3u32 {
        squares(120, 90, i)
            .save(dir.join(format!("frame_{:03}.png", i)))
            .unwrap();
    }
    let sequence = ImageSequence::new(&dir, "frame_", ".png")
        .with_range(0, 2)
        .with_fill_width(3);

    let mut pipeline = Pipeline::new(TrackingConfig::default()).unwrap();
    let stats = pipeline.run(&sequence).unwrap();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(stats[0].matches, None);
    assert!(stats[1].matches.is_some());
    assert!(stats[2].matches.is_some());
    assert_eq!(pipeline.buffer().len(), 2);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_image_aborts_the_run() {
    let dir = temp_dir("missing");
    squares(120, 90, 0).save(dir.join("img0.png")).unwrap();
    let sequence = ImageSequence::new(&dir, "img", ".png")
        .with_range(0, 1)
        .with_fill_width(1);

    let mut pipeline = Pipeline::new(TrackingConfig::default()).unwrap();
    let err = pipeline.run(&sequence).unwrap_err();
    assert!(matches!(err, TrackError::ImageLoad { .. }));
    assert_eq!(pipeline.buffer().len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn huge_range_over_missing_directory_fails_on_first_image() {
    let dir = std::env::temp_dir().join(format!("track-cli-absent-{}", std::process::id()));
    let sequence = ImageSequence::new(&dir, "img", ".png").with_range(0, 1 << 40);

    let mut pipeline = Pipeline::new(TrackingConfig::default()).unwrap();
    let err = pipeline.run(&sequence).unwrap_err();
    match err {
        TrackError::ImageLoad { path, .. } => assert_eq!(path, sequence.path_for(0)),
        other => panic!("unexpected error {}", other),
    }
    assert!(pipeline.buffer().is_empty());

    let sequence = sequence.with_range(3, usize::MAX);
    assert!(matches!(pipeline.run(&sequence), Err(TrackError::ImageLoad { .. })));
}

#[test]
fn visualization_writes_one_image_per_pair() {
    let dir = temp_dir("vis");
    let config = TrackingConfig::default().with_visualization(true);
    let writer = track_cli::MatchImageWriter::new(dir.join("out")).unwrap();
    let mut pipeline = Pipeline::new(config).unwrap().with_visualizer(Box::new(writer));
    for shift in 0..3 {
        pipeline.process_image(squares(120, 90, shift)).unwrap();
    }
    let mut written: Vec<String> = std::fs::read_dir(dir.join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    written.sort();
    assert_eq!(written, vec!["matches_0000_0001.png", "matches_0001_0002.png"]);

    std::fs::remove_dir_all(&dir).unwrap();
}
