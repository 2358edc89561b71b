pub mod params;
pub mod validators;

pub use params::{
    check_color_adjust_param, check_crop_size, check_degrees, check_erasing_value,
    check_fill_value, check_normalize_c_param, check_normalize_py_param, check_padding,
    check_resize_size,
};
