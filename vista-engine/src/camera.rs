//! 确定性的相机预设，全部以包围盒中心为锚点。

use vista_core::geometry::{Bounds3D, Point3, Vector3};
use vista_core::model::{CameraType, LevelCut};

use crate::host::Camera;

const MIN_DISTANCE: f64 = 1.0;

fn anchor(bounds: Option<Bounds3D>) -> (Point3, f64) {
    match bounds.filter(|bounds| !bounds.is_empty()) {
        Some(bounds) => (bounds.center(), bounds.diagonal().max(MIN_DISTANCE)),
        None => (Point3::origin(), MIN_DISTANCE),
    }
}

/// 按相机类型计算眼点/目标/上方向。
pub fn preset(camera_type: CameraType, bounds: Option<Bounds3D>) -> Camera {
    let (center, d) = anchor(bounds);
    let (offset, up) = match camera_type {
        CameraType::IsoPersp | CameraType::IsoOrtho => (Vector3::new(-d, -d, d), Vector3::Z),
        CameraType::IsoInvertedPersp | CameraType::IsoInvertedOrtho => {
            (Vector3::new(d, d, d), Vector3::Z)
        }
        CameraType::TopPersp | CameraType::TopOrtho => (Vector3::new(0.0, 0.0, d), Vector3::Y),
    };
    Camera {
        eye: center.translate(offset),
        target: center,
        up,
        perspective: camera_type.is_perspective(),
    }
}

/// 楼层相机：底面自上而下、天花自下而上，均为正交投影。
pub fn level_camera(cut: LevelCut, bounds: Option<Bounds3D>) -> Camera {
    let (center, d) = anchor(bounds);
    let offset = match cut {
        LevelCut::Base => Vector3::new(0.0, 0.0, d),
        LevelCut::Ceiling => Vector3::new(0.0, 0.0, -d),
    };
    Camera {
        eye: center.translate(offset),
        target: center,
        up: Vector3::Y,
        perspective: false,
    }
}

/// 剖面相机：眼点位于切面上，沿法线方向观察。
pub fn section_camera(position: Point3, normal: Vector3) -> Camera {
    let direction = normal.normalize().unwrap_or(Vector3::Y);
    Camera {
        eye: position,
        target: position.translate(direction),
        up: Vector3::Z,
        perspective: false,
    }
}
