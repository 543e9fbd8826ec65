// ============================================
// Direction - Смещения к соседям (грани, рёбра, углы)
// ============================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Direction {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
}

impl Direction {
    pub const fn new(dx: i32, dy: i32, dz: i32) -> Self {
        Self { dx, dy, dz }
    }

    /// Шесть граней в порядке битов маски перехода: -X, +X, -Y, +Y, -Z, +Z
    pub const FACES: [Direction; 6] = [
        Direction::new(-1, 0, 0),
        Direction::new(1, 0, 0),
        Direction::new(0, -1, 0),
        Direction::new(0, 1, 0),
        Direction::new(0, 0, -1),
        Direction::new(0, 0, 1),
    ];

    /// Все 26 соседей
    pub const ALL: [Direction; 26] = build_all();

    /// Бит грани в маске перехода (только для граней)
    pub fn face_bit(&self) -> Option<u8> {
        Self::FACES.iter().position(|d| d == self).map(|i| 1u8 << i)
    }

    /// Число ненулевых компонент: 1 грань, 2 ребро, 3 угол
    pub fn order(&self) -> u32 {
        (self.dx != 0) as u32 + (self.dy != 0) as u32 + (self.dz != 0) as u32
    }

    pub fn is_face(&self) -> bool {
        self.order() == 1
    }

    pub fn opposite(&self) -> Self {
        Self::new(-self.dx, -self.dy, -self.dz)
    }

    pub fn as_array(&self) -> [i32; 3] {
        [self.dx, self.dy, self.dz]
    }

    /// Позиция в `ALL` (None для нулевого смещения)
    pub fn index(&self) -> Option<usize> {
        let (dx, dy, dz) = (self.dx.signum(), self.dy.signum(), self.dz.signum());
        if dx == 0 && dy == 0 && dz == 0 {
            return None;
        }
        let raw = ((dz + 1) * 9 + (dy + 1) * 3 + (dx + 1)) as usize;
        Some(if raw > 13 { raw - 1 } else { raw })
    }

    /// Направление от чанка к локальной точке сетки (-1..=17)
    pub fn of_local(i: i32, j: i32, k: i32, max: i32) -> Option<Direction> {
        let axis = |v: i32| if v < 0 { -1 } else if v > max { 1 } else { 0 };
        let d = Direction::new(axis(i), axis(j), axis(k));
        if d.order() == 0 { None } else { Some(d) }
    }
}

const fn build_all() -> [Direction; 26] {
    let mut out = [Direction::new(0, 0, 0); 26];
    let mut i = 0;
    let mut dz = -1;
    while dz <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dx = -1;
            while dx <= 1 {
                if !(dx == 0 && dy == 0 && dz == 0) {
                    out[i] = Direction::new(dx, dy, dz);
                    i += 1;
                }
                dx += 1;
            }
            dy += 1;
        }
        dz += 1;
    }
    out
}
