//! Coefficient tables of the named commutator-free presets.
//!
//! Rows are listed in application order: row 0 is the first exponential applied to ψ.

/// Gauss-Legendre nodes of order 4.
pub const GAUSS2_NODES: [f64; 2] = [0.211_324_865_405_187_1, 0.788_675_134_594_812_9];

/// Gauss-Legendre nodes of order 6.
pub const GAUSS3_NODES: [f64; 3] = [0.112_701_665_379_258_3, 0.5, 0.887_298_334_620_741_7];

/// Exponential midpoint rule.
pub const CF2_NODES: [f64; 1] = [0.5];
pub const CF2_WEIGHTS: [[f64; 1]; 1] = [[1.0]];

/// Two exponentials of order 4 (Blanes and Moan).
pub const CF4_WEIGHTS: [[f64; 2]; 2] = [
    [0.538_675_134_594_812_9, -0.038_675_134_594_812_88],
    [-0.038_675_134_594_812_88, 0.538_675_134_594_812_9],
];

/// Three exponentials of order 4 with optimised error constants (Alvermann and Fehske).
pub const CF4O_WEIGHTS: [[f64; 3]; 3] = [
    [
        0.302_556_833_188_023_6,
        -0.033_333_333_333_333_33,
        0.005_776_500_145_309_698,
    ],
    [
        -0.030_555_555_555_555_556,
        0.511_111_111_111_111_1,
        -0.030_555_555_555_555_556,
    ],
    [
        0.005_776_500_145_309_698,
        -0.033_333_333_333_333_33,
        0.302_556_833_188_023_6,
    ],
];

/// Six exponentials of order 6 on the Gauss nodes.
pub const CF6_WEIGHTS: [[f64; 3]; 6] = [
    [0.215_838_996_975_767_8, -0.076_717_964_591_551_4, 0.020_878_967_615_783_7],
    [-0.080_897_796_320_853, -0.178_747_217_537_157_6, 0.032_263_366_431_047_3],
    [0.180_628_460_055_830_1, 0.477_687_404_350_931_3, -0.090_934_216_979_798_1],
    [-0.090_934_216_979_798_1, 0.477_687_404_350_931_3, 0.180_628_460_055_830_1],
    [0.032_263_366_431_047_3, -0.178_747_217_537_157_6, -0.080_897_796_320_853],
    [0.020_878_967_615_783_7, -0.076_717_964_591_551_4, 0.215_838_996_975_767_8],
];

/// Suzuki's symmetric five-fold composition `(g, g, 1 - 4g, g, g)` with
/// `g = 1 / (4 - 4^(1/7))`, raising the symmetric order 6 to 8.
pub const SUZUKI8_FRACTIONS: [f64; 5] = [
    0.359_584_649_349_992_25,
    0.359_584_649_349_992_25,
    -0.438_338_597_399_969_01,
    0.359_584_649_349_992_25,
    0.359_584_649_349_992_25,
];

/// Suzuki's composition with `g = 1 / (4 - 4^(1/9))`, raising the symmetric order 8 to 10.
pub const SUZUKI10_FRACTIONS: [f64; 5] = [
    0.352_924_033_444_267_72,
    0.352_924_033_444_267_72,
    -0.411_696_133_777_070_87,
    0.352_924_033_444_267_72,
    0.352_924_033_444_267_72,
];

/// Non-symmetric composition satisfying `sum a = 1` and `sum a^7 = 0`, raising order 6 to 7.
pub const ORDER7_FRACTIONS: [f64; 5] = [
    0.33,
    0.36,
    -0.443_638_006_225_110_05,
    0.37,
    0.383_638_006_225_110_05,
];
